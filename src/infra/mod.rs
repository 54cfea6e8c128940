//! Infrastructure adapters: device drivers that run in-process.

pub mod drivers;

pub use drivers::{CommitRecord, FixedStatusDriver, SimulatedBattery};
