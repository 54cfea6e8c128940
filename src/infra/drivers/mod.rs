//! In-process device drivers.

pub mod fixed;
pub mod simulated;

pub use fixed::{CommitRecord, FixedStatusDriver};
pub use simulated::SimulatedBattery;
