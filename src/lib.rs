//! # BatteryOS
//!
//! Composable virtual batteries. A physical battery, or anything else that
//! sources and sinks current, is wrapped in a resource with its own
//! background scheduler. Resources can be aggregated (several sources
//! presented as one battery) or partitioned (one source split into children
//! with their own accounting), and every client can reserve future charge or
//! discharge current over a time window.
//!
//! ## Building blocks
//!
//! - **Scheduler**: one OS thread per resource, an ordered event queue and a
//!   cached status refreshed lazily or periodically. Events due together are
//!   drained as a batch and committed as one net current.
//! - **Interval merge**: overlapping reservations of the same requester are
//!   trimmed, cancelled or nested so at most one net magnitude applies per
//!   requester at any instant.
//! - **Directory**: owns every resource by name and tracks derivation edges.
//!   A resource sources at most one composition.
//! - **Compositions**: aggregates split requests by headroom at a common
//!   C-rate; partitions apportion the source proportionally or by tranche
//!   and forward the combined current of their children.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use battery_os::builders::ResourceFactory;
//! use battery_os::config::{AggregateConfig, ResourceConfig};
//! use battery_os::core::{Directory, ScheduleRequest};
//! use battery_os::infra::SimulatedBattery;
//!
//! let factory = ResourceFactory::new(Arc::new(Directory::default()));
//! factory.create_physical("a", Box::new(SimulatedBattery::new(status_a)), ResourceConfig::default())?;
//! factory.create_physical("b", Box::new(SimulatedBattery::new(status_b)), ResourceConfig::default())?;
//! let ab = factory.create_aggregate("ab", &["a", "b"], &AggregateConfig::default())?;
//!
//! let seq = factory.directory().sequences().next();
//! ab.schedule(&ScheduleRequest::new("ab", seq, 500.0, start_ms, end_ms))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Events, schedulers, the directory and composition policies.
pub mod core;
/// Configuration models for resources and topologies.
pub mod config;
/// Factories that create resources and whole topologies.
pub mod builders;
/// In-process device drivers.
pub mod infra;
/// Client-facing models and the async facade.
pub mod runtime;
/// Shared utilities.
pub mod util;
