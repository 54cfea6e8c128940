//! Proportion vectors for fan-out compositions.

use serde::{Deserialize, Serialize};

use crate::core::{BosError, BosResult};

const SUM_TOLERANCE: f64 = 1e-6;

/// Share of a source granted to one partition child.
///
/// Every component lies in `[0, 1]`. Across the children of one partition the
/// capacity and charge-rate shares must each sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Share of the state of charge.
    pub capacity: f64,
    /// Share of the full-charge capacity.
    pub max_capacity: f64,
    /// Share of the charge-current limit.
    pub max_charge: f64,
    /// Share of the discharge-current limit.
    pub max_discharge: f64,
}

impl Scale {
    /// A scale with every component set explicitly.
    #[must_use]
    pub const fn new(capacity: f64, max_capacity: f64, max_charge: f64, max_discharge: f64) -> Self {
        Self {
            capacity,
            max_capacity,
            max_charge,
            max_discharge,
        }
    }

    /// The same share in every dimension.
    #[must_use]
    pub const fn uniform(share: f64) -> Self {
        Self::new(share, share, share, share)
    }

    /// Build from 2 to 4 components.
    ///
    /// * `[c, r]`: capacity shares `c`, rate shares `r`
    /// * `[c, ch, dis]`: capacity shares `c`, separate charge/discharge shares
    /// * `[c, mc, ch, dis]`: every component
    pub fn from_components(components: &[f64]) -> BosResult<Self> {
        let scale = match *components {
            [c, r] => Self::new(c, c, r, r),
            [c, ch, dis] => Self::new(c, c, ch, dis),
            [c, mc, ch, dis] => Self::new(c, mc, ch, dis),
            _ => {
                return Err(BosError::InvalidScale(format!(
                    "expected 2 to 4 components, got {}",
                    components.len()
                )))
            }
        };
        scale.validate()?;
        Ok(scale)
    }

    /// Every component within `[0, 1]`.
    pub fn validate(&self) -> BosResult<()> {
        for (label, v) in [
            ("capacity", self.capacity),
            ("max_capacity", self.max_capacity),
            ("max_charge", self.max_charge),
            ("max_discharge", self.max_discharge),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(BosError::InvalidScale(format!("{label} share {v} outside [0, 1]")));
            }
        }
        Ok(())
    }

    /// Validate a complete set of sibling scales.
    pub fn validate_set(scales: &[Self]) -> BosResult<()> {
        if scales.is_empty() {
            return Err(BosError::InvalidScale("no scales given".into()));
        }
        for scale in scales {
            scale.validate()?;
        }
        let capacity: f64 = scales.iter().map(|s| s.capacity).sum();
        let charge: f64 = scales.iter().map(|s| s.max_charge).sum();
        if (capacity - 1.0).abs() > SUM_TOLERANCE {
            return Err(BosError::InvalidScale(format!(
                "capacity shares sum to {capacity}, expected 1"
            )));
        }
        if (charge - 1.0).abs() > SUM_TOLERANCE {
            return Err(BosError::InvalidScale(format!(
                "charge-rate shares sum to {charge}, expected 1"
            )));
        }
        Ok(())
    }
}
