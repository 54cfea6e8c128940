//! Whole-topology configuration: physical resources, aggregates and
//! partitions, created in that order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ResourceConfig;
use crate::core::partition::PartitionPolicy;
use crate::core::scale::Scale;
use crate::core::status::Status;

/// Default band around the mean parent voltage, in mV.
pub const DEFAULT_VOLTAGE_TOLERANCE_MV: f64 = 500.0;

const fn default_voltage_tolerance_mv() -> f64 {
    DEFAULT_VOLTAGE_TOLERANCE_MV
}

/// Aggregate scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Scheduler settings.
    #[serde(default)]
    pub resource: ResourceConfig,
    /// Allowed deviation of a parent's voltage from the mean, in mV.
    #[serde(default = "default_voltage_tolerance_mv")]
    pub voltage_tolerance_mv: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            resource: ResourceConfig::default(),
            voltage_tolerance_mv: DEFAULT_VOLTAGE_TOLERANCE_MV,
        }
    }
}

impl AggregateConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        self.resource.validate()?;
        if self.voltage_tolerance_mv.is_nan() || self.voltage_tolerance_mv < 0.0 {
            return Err("voltage_tolerance_mv must be non-negative".into());
        }
        Ok(())
    }
}

/// A physical resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSpec {
    /// Resource name.
    pub name: String,
    /// Scheduler settings.
    #[serde(default)]
    pub resource: ResourceConfig,
    /// Starting status for in-process drivers.
    #[serde(default)]
    pub initial: Option<Status>,
}

/// An aggregate over existing resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Aggregate name.
    pub name: String,
    /// Parent names, in split order.
    pub parents: Vec<String>,
    /// Aggregate settings.
    #[serde(default)]
    pub config: AggregateConfig,
}

/// One child of a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionChildSpec {
    /// Child name.
    pub name: String,
    /// 2 to 4 scale components, see [`Scale::from_components`].
    pub scale: Vec<f64>,
}

/// A partition of an existing resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Partitioned source.
    pub source: String,
    /// Allocation policy.
    pub policy: PartitionPolicy,
    /// Children in priority order.
    pub children: Vec<PartitionChildSpec>,
    /// Manager scheduler settings.
    #[serde(default)]
    pub resource: ResourceConfig,
}

impl PartitionSpec {
    /// Child names and parsed scales.
    pub fn scales(&self) -> Result<Vec<(String, Scale)>, String> {
        self.children
            .iter()
            .map(|c| {
                Scale::from_components(&c.scale)
                    .map(|s| (c.name.clone(), s))
                    .map_err(|e| format!("child `{}`: {e}", c.name))
            })
            .collect()
    }
}

/// Root topology configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Physical resources.
    pub physical: Vec<PhysicalSpec>,
    /// Aggregates, created after every physical resource.
    #[serde(default)]
    pub aggregates: Vec<AggregateSpec>,
    /// Partitions, created last.
    #[serde(default)]
    pub partitions: Vec<PartitionSpec>,
}

impl TopologyConfig {
    /// Validate names, references and scales.
    pub fn validate(&self) -> Result<(), String> {
        let mut known = HashSet::new();
        let mut claim = |name: &str| {
            if name.is_empty() {
                return Err("resource names must not be empty".to_string());
            }
            if !known.insert(name.to_string()) {
                return Err(format!("duplicate resource name `{name}`"));
            }
            Ok(())
        };

        for p in &self.physical {
            claim(&p.name)?;
            p.resource
                .validate()
                .map_err(|e| format!("physical `{}` invalid: {e}", p.name))?;
        }
        for a in &self.aggregates {
            claim(&a.name)?;
            if a.parents.is_empty() {
                return Err(format!("aggregate `{}` has no parents", a.name));
            }
            a.config
                .validate()
                .map_err(|e| format!("aggregate `{}` invalid: {e}", a.name))?;
        }
        for part in &self.partitions {
            for child in &part.children {
                claim(&child.name)?;
            }
            part.resource
                .validate()
                .map_err(|e| format!("partition of `{}` invalid: {e}", part.source))?;
            let scales: Vec<Scale> = part.scales()?.into_iter().map(|(_, s)| s).collect();
            Scale::validate_set(&scales).map_err(|e| format!("partition of `{}`: {e}", part.source))?;
        }

        let defined: HashSet<&str> = self
            .physical
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.aggregates.iter().map(|a| a.name.as_str()))
            .chain(self.partitions.iter().flat_map(|p| p.children.iter().map(|c| c.name.as_str())))
            .collect();
        for a in &self.aggregates {
            if let Some(missing) = a.parents.iter().find(|p| !defined.contains(p.as_str())) {
                return Err(format!("aggregate `{}` references unknown `{missing}`", a.name));
            }
        }
        for part in &self.partitions {
            if !defined.contains(part.source.as_str()) {
                return Err(format!("partition references unknown source `{}`", part.source));
            }
        }
        Ok(())
    }

    /// Parse topology configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
