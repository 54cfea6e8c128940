//! Error types for directory, scheduler and composition operations.

use thiserror::Error;

/// Errors produced by resources, the directory and the composition policies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BosError {
    /// A resource with this name is already registered.
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    /// No resource with this name is registered.
    #[error("unknown name: {0}")]
    UnknownName(String),
    /// The requested window starts in the past or is empty.
    #[error("invalid window: start {start_ms} end {end_ms} (now {now_ms})")]
    InvalidWindow {
        /// Requested start, ms since epoch.
        start_ms: u128,
        /// Requested end, ms since epoch.
        end_ms: u128,
        /// Time the request was checked.
        now_ms: u128,
    },
    /// The requested magnitude exceeds the reported limit.
    #[error("out of range: requested {requested} mA, limit {limit} mA")]
    OutOfRange {
        /// Requested current in mA.
        requested: f64,
        /// Relevant reported limit in mA.
        limit: f64,
    },
    /// The resource already sources another composition.
    #[error("already sourced: {0}")]
    AlreadySourced(String),
    /// A parent or child rejected a forwarded schedule.
    #[error("forward to {target} failed: {reason}")]
    ForwardFailed {
        /// Name of the resource that rejected the request.
        target: String,
        /// Rejection reason.
        reason: String,
    },
    /// A prospective composition source is still carrying current.
    #[error("source {name} is not idle (current {current} mA)")]
    SourceNotIdle {
        /// Source name.
        name: String,
        /// Current it reported.
        current: f64,
    },
    /// Scale components out of range or not summing to one.
    #[error("invalid scale: {0}")]
    InvalidScale(String),
    /// Adding the edge would close a cycle.
    #[error("edge {parent} -> {child} would create a cycle")]
    CycleDetected {
        /// Parent name.
        parent: String,
        /// Child name.
        child: String,
    },
    /// The operation is not available on this kind of resource.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Device driver failure.
    #[error("driver error: {0}")]
    Driver(String),
    /// A referenced resource has been removed.
    #[error("resource gone: {0}")]
    ResourceGone(String),
    /// Configuration rejected.
    #[error("config invalid: {0}")]
    Config(String),
}

impl BosError {
    /// Wrap a failed forward to `target`.
    pub fn forward(target: impl Into<String>, cause: &Self) -> Self {
        Self::ForwardFailed {
            target: target.into(),
            reason: cause.to_string(),
        }
    }
}

/// Result alias for library operations.
pub type BosResult<T> = Result<T, BosError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
