//! Core scheduling abstractions: events, the per-resource scheduler, the
//! directory and the composition policies.

pub mod aggregate;
pub mod directory;
pub mod driver;
pub mod error;
pub mod event;
pub mod event_queue;
pub mod merge;
pub mod partition;
pub mod request;
pub mod resource;
pub mod scale;
pub mod scheduler;
pub mod sequence;
pub mod status;

pub use aggregate::{Aggregate, AggregateBackend, AggregateSnapshot};
pub use directory::{Directory, ResourceId};
pub use driver::{DeviceDriver, DriverBackend, Leaf};
pub use error::{AppResult, BosError, BosResult};
pub use event::{Event, EventKind};
pub use event_queue::{Drain, EventQueue, Reservation};
pub use merge::{MergeAction, MergeOutcome};
pub use partition::{ChildAccount, Partition, PartitionBackend, PartitionChild, PartitionPolicy};
pub use request::ScheduleRequest;
pub use resource::{Resource, ResourceKind, ResourceLink};
pub use scale::Scale;
pub use scheduler::{Backend, CommitPlan, Scheduler, CURRENT_EPSILON_MA};
pub use sequence::{SequenceGenerator, SequenceSource};
pub use status::{RefreshMode, Status};
