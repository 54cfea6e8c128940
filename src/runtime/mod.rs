//! Client-facing surface: request/response models and the async facade.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_facade;

pub use api::{status_of, submit_schedule, ScheduleResponse, ScheduleSubmission, StatusResponse};
#[cfg(feature = "tokio-runtime")]
pub use tokio_facade::{get_status_async, schedule_async};
