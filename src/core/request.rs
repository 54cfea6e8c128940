//! Reservation requests as they travel through the resource tree.

use serde::{Deserialize, Serialize};

use crate::core::{BosError, BosResult};

/// A request to hold a current over `[start_ms, end_ms)`.
///
/// `requester` is the resource that originated the request; it stays the same
/// while the request is forwarded up or down the tree. `sequence` identifies
/// the reservation for later updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Target current in mA (positive = discharging).
    pub target_ma: f64,
    /// Whether the target is a floor rather than a ceiling.
    pub is_floor: bool,
    /// Window start, ms since epoch.
    pub start_ms: u128,
    /// Window end (exclusive), ms since epoch.
    pub end_ms: u128,
    /// Originating resource.
    pub requester: String,
    /// Reservation key.
    pub sequence: u64,
}

impl ScheduleRequest {
    /// Build a ceiling request.
    pub fn new(
        requester: impl Into<String>,
        sequence: u64,
        target_ma: f64,
        start_ms: u128,
        end_ms: u128,
    ) -> Self {
        Self {
            target_ma,
            is_floor: false,
            start_ms,
            end_ms,
            requester: requester.into(),
            sequence,
        }
    }

    /// Mark the target as a floor.
    #[must_use]
    pub const fn with_floor(mut self, is_floor: bool) -> Self {
        self.is_floor = is_floor;
        self
    }

    /// Same window and identity with a different magnitude.
    #[must_use]
    pub fn with_target(&self, target_ma: f64) -> Self {
        Self {
            target_ma,
            ..self.clone()
        }
    }

    /// Reject windows that start before `now_ms` or are empty.
    pub const fn check_window(&self, now_ms: u128) -> BosResult<()> {
        if self.start_ms < now_ms || self.end_ms <= self.start_ms {
            return Err(BosError::InvalidWindow {
                start_ms: self.start_ms,
                end_ms: self.end_ms,
                now_ms,
            });
        }
        Ok(())
    }

    /// Whether `[begin_ms, end_ms)` intersects this request's window.
    #[must_use]
    pub const fn overlaps(&self, begin_ms: u128, end_ms: u128) -> bool {
        begin_ms < self.end_ms && self.start_ms < end_ms
    }
}
