//! Configuration models for resources, aggregates and whole topologies.

pub mod resource;
pub mod topology;

pub use resource::{ResourceConfig, MIN_ACTIVE_STALENESS_MS};
pub use topology::{
    AggregateConfig, AggregateSpec, PartitionChildSpec, PartitionSpec, PhysicalSpec, TopologyConfig,
    DEFAULT_VOLTAGE_TOLERANCE_MV,
};
