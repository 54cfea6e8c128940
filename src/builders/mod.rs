//! Builders that create resources and whole topologies.

pub mod factory;
pub mod topology;

pub use factory::ResourceFactory;
pub use topology::{build_topology, load_topology, simulated_driver};
