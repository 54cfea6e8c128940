//! Tests for error types

use battery_os::core::{AppResult, BosError, BosResult};

#[test]
fn test_duplicate_name_error() {
    let err = BosError::DuplicateName("pack".to_string());
    assert_eq!(format!("{}", err), "duplicate name: pack");
}

#[test]
fn test_invalid_window_error() {
    let err = BosError::InvalidWindow {
        start_ms: 10,
        end_ms: 5,
        now_ms: 7,
    };
    assert_eq!(format!("{}", err), "invalid window: start 10 end 5 (now 7)");
}

#[test]
fn test_out_of_range_error() {
    let err = BosError::OutOfRange {
        requested: 600.0,
        limit: 500.0,
    };
    assert_eq!(format!("{}", err), "out of range: requested 600 mA, limit 500 mA");
}

#[test]
fn test_forward_wraps_cause() {
    let cause = BosError::OutOfRange {
        requested: 8.0,
        limit: 4.0,
    };
    let err = BosError::forward("cell-b", &cause);
    assert_eq!(
        err,
        BosError::ForwardFailed {
            target: "cell-b".to_string(),
            reason: "out of range: requested 8 mA, limit 4 mA".to_string(),
        }
    );
    assert!(format!("{}", err).starts_with("forward to cell-b failed"));
}

#[test]
fn test_cycle_error() {
    let err = BosError::CycleDetected {
        parent: "a".to_string(),
        child: "b".to_string(),
    };
    assert_eq!(format!("{}", err), "edge a -> b would create a cycle");
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn lookup() -> BosResult<()> {
        Err(BosError::UnknownName("ghost".to_string()))
    }
    fn app() -> AppResult<()> {
        lookup()?;
        Ok(())
    }
    let err = app().unwrap_err();
    assert_eq!(err.to_string(), "unknown name: ghost");
    assert!(err.downcast_ref::<BosError>().is_some());
}
