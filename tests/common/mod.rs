//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use battery_os::builders::ResourceFactory;
use battery_os::config::ResourceConfig;
use battery_os::core::{Directory, Reservation, Resource, Status};
use battery_os::infra::FixedStatusDriver;
use battery_os::util::clock::now_ms;

pub const TOLERANCE: f64 = 1e-6;

/// Battery snapshot with symmetric charge and discharge limits.
pub fn battery(capacity: f64, max_capacity: f64, max_rate: f64) -> Status {
    Status {
        voltage_mv: 5_000.0,
        current_ma: 0.0,
        capacity_mah: capacity,
        max_capacity_mah: max_capacity,
        max_charge_current_ma: max_rate,
        max_discharge_current_ma: max_rate,
        timestamp_ms: 0,
    }
}

pub fn factory() -> ResourceFactory {
    ResourceFactory::new(Arc::new(Directory::default()))
}

/// Register a physical resource backed by a fixed-status driver and return
/// the driver handle alongside it.
pub fn physical(factory: &ResourceFactory, name: &str, status: Status) -> (Arc<Resource>, FixedStatusDriver) {
    let driver = FixedStatusDriver::new(status);
    let resource = factory
        .create_physical(name, Box::new(driver.clone()), ResourceConfig::default())
        .unwrap();
    (resource, driver)
}

/// Milliseconds from now.
pub fn at(offset_ms: u128) -> u128 {
    now_ms() + offset_ms
}

/// Poll `cond` every 10 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Planned magnitude at `t` over `reservations`.
pub fn level_at(reservations: &[Reservation], t: u128) -> f64 {
    reservations
        .iter()
        .filter(|r| r.covers(t))
        .map(|r| r.magnitude_ma)
        .sum()
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < TOLERANCE
}
