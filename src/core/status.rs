//! Status snapshot reported by every resource.

use serde::{Deserialize, Serialize};

/// A point-in-time snapshot of a battery.
///
/// Current is signed: positive means discharging, negative means charging.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Status {
    /// Terminal voltage in mV.
    pub voltage_mv: f64,
    /// Present current in mA (positive = discharging).
    pub current_ma: f64,
    /// State of charge in mAh.
    pub capacity_mah: f64,
    /// Full-charge capacity in mAh.
    pub max_capacity_mah: f64,
    /// Largest charge current the battery accepts, in mA (positive value).
    pub max_charge_current_ma: f64,
    /// Largest discharge current the battery supplies, in mA (positive value).
    pub max_discharge_current_ma: f64,
    /// When the snapshot was taken, ms since epoch.
    pub timestamp_ms: u128,
}

impl Status {
    /// The limit that applies to `target_ma`: discharge limit for positive
    /// targets, charge limit for negative ones.
    #[must_use]
    pub fn limit_for(&self, target_ma: f64) -> f64 {
        if target_ma >= 0.0 {
            self.max_discharge_current_ma
        } else {
            self.max_charge_current_ma
        }
    }

    /// Whether `|target_ma|` fits the relevant limit.
    #[must_use]
    pub fn admits(&self, target_ma: f64) -> bool {
        target_ma.abs() <= self.limit_for(target_ma)
    }

    /// Room left to charge, in mAh.
    #[must_use]
    pub fn charge_headroom(&self) -> f64 {
        (self.max_capacity_mah - self.capacity_mah).max(0.0)
    }

    /// Charge available to discharge, in mAh.
    #[must_use]
    pub fn discharge_headroom(&self) -> f64 {
        self.capacity_mah.max(0.0)
    }

    /// True when nothing has been read yet.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.timestamp_ms == 0 && self.max_capacity_mah == 0.0
    }

    /// Copy with the timestamp replaced.
    #[must_use]
    pub const fn stamped(mut self, timestamp_ms: u128) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// How a resource keeps its cached status fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Refresh on read when the cache is older than the staleness bound.
    #[default]
    Lazy,
    /// Refresh periodically from the background scheduler.
    Active,
}
