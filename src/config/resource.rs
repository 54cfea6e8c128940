//! Per-resource scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::status::RefreshMode;

/// Smallest staleness bound accepted in ACTIVE mode.
pub const MIN_ACTIVE_STALENESS_MS: u64 = 100;

/// Default staleness bound.
pub const DEFAULT_MAX_STALENESS_MS: u64 = 1_000;

/// Environment variable overriding [`ResourceConfig::max_staleness_ms`].
pub const ENV_MAX_STALENESS_MS: &str = "BOS_MAX_STALENESS_MS";

/// Environment variable overriding [`ResourceConfig::refresh_mode`].
pub const ENV_REFRESH_MODE: &str = "BOS_REFRESH_MODE";

/// How a resource's scheduler keeps its status fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Maximum age of the cached status, in milliseconds.
    #[serde(default = "default_max_staleness_ms")]
    pub max_staleness_ms: u64,
    /// Refresh policy.
    #[serde(default)]
    pub refresh_mode: RefreshMode,
}

const fn default_max_staleness_ms() -> u64 {
    DEFAULT_MAX_STALENESS_MS
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_staleness_ms: DEFAULT_MAX_STALENESS_MS,
            refresh_mode: RefreshMode::Lazy,
        }
    }
}

impl ResourceConfig {
    /// Lazy refresh with the given staleness bound.
    #[must_use]
    pub const fn lazy(max_staleness_ms: u64) -> Self {
        Self {
            max_staleness_ms,
            refresh_mode: RefreshMode::Lazy,
        }
    }

    /// Active refresh with the given period.
    #[must_use]
    pub const fn active(max_staleness_ms: u64) -> Self {
        Self {
            max_staleness_ms,
            refresh_mode: RefreshMode::Active,
        }
    }

    /// Staleness bound as a [`Duration`].
    #[must_use]
    pub const fn max_staleness(&self) -> Duration {
        Duration::from_millis(self.max_staleness_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_mode == RefreshMode::Active
            && self.max_staleness_ms < MIN_ACTIVE_STALENESS_MS
        {
            return Err(format!(
                "max_staleness_ms must be at least {MIN_ACTIVE_STALENESS_MS} in active mode"
            ));
        }
        Ok(())
    }

    /// Defaults overridden by `BOS_MAX_STALENESS_MS` / `BOS_REFRESH_MODE`,
    /// after loading a `.env` file if one is present.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var(ENV_MAX_STALENESS_MS) {
            cfg.max_staleness_ms = raw
                .trim()
                .parse()
                .map_err(|e| format!("{ENV_MAX_STALENESS_MS}: {e}"))?;
        }
        if let Ok(raw) = std::env::var(ENV_REFRESH_MODE) {
            cfg.refresh_mode = match raw.trim().to_ascii_lowercase().as_str() {
                "lazy" => RefreshMode::Lazy,
                "active" => RefreshMode::Active,
                other => return Err(format!("{ENV_REFRESH_MODE}: unknown mode `{other}`")),
            };
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
