//! Build a whole topology from configuration.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::builders::ResourceFactory;
use crate::config::{PhysicalSpec, TopologyConfig};
use crate::core::{AppResult, BosError, BosResult, DeviceDriver, Resource};
use crate::infra::SimulatedBattery;

/// Create every resource in `cfg` through `factory`, physical resources
/// first, then aggregates, then partitions. Drivers come from
/// `driver_factory`.
///
/// Returns the created resources in creation order; partition managers are
/// not included.
///
/// # Errors
///
/// `Config` if the configuration is invalid, otherwise the first creation
/// failure. Resources created before the failure stay registered.
pub fn build_topology<F>(
    cfg: &TopologyConfig,
    factory: &ResourceFactory,
    mut driver_factory: F,
) -> BosResult<Vec<Arc<Resource>>>
where
    F: FnMut(&PhysicalSpec) -> BosResult<Box<dyn DeviceDriver>>,
{
    cfg.validate()
        .map_err(|e| BosError::Config(format!("config invalid: {e}")))?;

    let mut created = Vec::new();
    for spec in &cfg.physical {
        let driver = driver_factory(spec)?;
        created.push(factory.create_physical(&spec.name, driver, spec.resource)?);
    }
    for spec in &cfg.aggregates {
        created.push(factory.create_aggregate(&spec.name, &spec.parents, &spec.config)?);
    }
    for spec in &cfg.partitions {
        let children = spec.scales().map_err(BosError::Config)?;
        created.extend(factory.create_partition(&spec.source, spec.policy, &children, spec.resource)?);
    }
    Ok(created)
}

/// Read a JSON topology file and build it with [`build_topology`].
///
/// # Errors
///
/// Read, parse and creation failures, each tagged with the file path.
pub fn load_topology<F>(
    path: impl AsRef<Path>,
    factory: &ResourceFactory,
    driver_factory: F,
) -> AppResult<Vec<Arc<Resource>>>
where
    F: FnMut(&PhysicalSpec) -> BosResult<Box<dyn DeviceDriver>>,
{
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading topology {}", path.display()))?;
    let cfg = TopologyConfig::from_json_str(&raw)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("parsing topology {}", path.display()))?;
    let created = build_topology(&cfg, factory, driver_factory)
        .with_context(|| format!("building topology {}", path.display()))?;
    info!(path = %path.display(), resources = created.len(), "topology loaded");
    Ok(created)
}

/// Driver factory that simulates every physical resource from its
/// `initial` status.
///
/// # Errors
///
/// `Config` when a physical resource has no initial status.
pub fn simulated_driver(spec: &PhysicalSpec) -> BosResult<Box<dyn DeviceDriver>> {
    let initial = spec
        .initial
        .ok_or_else(|| BosError::Config(format!("physical `{}` has no initial status", spec.name)))?;
    Ok(Box::new(SimulatedBattery::new(initial)))
}
