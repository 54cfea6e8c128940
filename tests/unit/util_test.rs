//! Tests for utility functions

use std::time::Duration;

use battery_os::core::{SequenceGenerator, SequenceSource};
use battery_os::util::{after, hours_between, init_tracing, now_ms, until, MS_PER_HOUR};

#[test]
fn test_clock_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_hours_between() {
    assert_eq!(hours_between(0, 3_600_000), 1.0);
    assert_eq!(hours_between(5, 0), 0.0);
    assert_eq!(MS_PER_HOUR, 3_600_000.0);
}

#[test]
fn test_until_and_after() {
    let deadline = after(now_ms(), Duration::from_millis(500));
    let left = until(deadline);
    assert!(left <= Duration::from_millis(500));
    assert!(left > Duration::from_millis(100));
    assert_eq!(until(0), Duration::ZERO);
}

#[test]
fn test_sequences_are_unique_across_threads() {
    let generator = std::sync::Arc::new(SequenceGenerator::starting_at(1));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let generator = std::sync::Arc::clone(&generator);
            std::thread::spawn(move || (0..250).map(|_| generator.next()).collect::<Vec<u64>>())
        })
        .collect();
    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 1_000);
    assert_eq!(generator.peek(), 1_001);
}

#[test]
fn test_init_tracing_is_repeatable() {
    init_tracing();
    init_tracing();
}
