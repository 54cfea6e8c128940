//! Wall-clock helpers. All timepoints in this crate are milliseconds since the
//! Unix epoch.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds in one hour, used for coulomb counting (mA × h = mAh).
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Hours elapsed between two timepoints; zero if `to_ms` is not after `from_ms`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hours_between(from_ms: u128, to_ms: u128) -> f64 {
    to_ms.saturating_sub(from_ms) as f64 / MS_PER_HOUR
}

/// Time left until `deadline_ms`, or zero if it already passed.
#[must_use]
pub fn until(deadline_ms: u128) -> Duration {
    let left = deadline_ms.saturating_sub(now_ms());
    Duration::from_millis(u64::try_from(left).unwrap_or(u64::MAX))
}

/// `base_ms` shifted forward by `offset`.
#[must_use]
pub fn after(base_ms: u128, offset: Duration) -> u128 {
    base_ms + offset.as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_between_is_saturating() {
        assert_eq!(hours_between(10, 5), 0.0);
        assert!((hours_between(0, 1_800_000) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn until_past_deadline_is_zero() {
        assert_eq!(until(0), Duration::ZERO);
    }

    #[test]
    fn after_adds_offset() {
        assert_eq!(after(1_000, Duration::from_secs(2)), 3_000);
    }
}
