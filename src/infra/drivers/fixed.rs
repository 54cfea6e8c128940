//! Driver that reports a configured status and records every commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::{BosError, BosResult, DeviceDriver, Status};
use crate::util::clock::now_ms;

/// One `commit_current` call as seen by the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitRecord {
    /// Requested current.
    pub target_ma: f64,
    /// Floor flag.
    pub is_floor: bool,
    /// When the call arrived.
    pub at_ms: u128,
}

#[derive(Debug, Default)]
struct Inner {
    status: Mutex<Status>,
    commits: Mutex<Vec<CommitRecord>>,
    fail_refresh: AtomicBool,
    fail_commit: AtomicBool,
    refresh_delay: Mutex<Duration>,
}

/// Fixed-status driver. Clones share state, so a test can keep a handle
/// while the resource owns the boxed driver.
///
/// The reported current follows the last accepted commit.
#[derive(Debug, Clone, Default)]
pub struct FixedStatusDriver {
    inner: Arc<Inner>,
}

impl FixedStatusDriver {
    /// Report `status` on every refresh.
    #[must_use]
    pub fn new(status: Status) -> Self {
        let driver = Self::default();
        *driver.inner.status.lock() = status;
        driver
    }

    /// Replace the reported status.
    pub fn set_status(&self, status: Status) {
        *self.inner.status.lock() = status;
    }

    /// Make subsequent refreshes fail.
    pub fn fail_refresh(&self, fail: bool) {
        self.inner.fail_refresh.store(fail, Ordering::Release);
    }

    /// Make subsequent commits fail.
    pub fn fail_commit(&self, fail: bool) {
        self.inner.fail_commit.store(fail, Ordering::Release);
    }

    /// Make every refresh take at least `delay`, like a slow bus.
    pub fn delay_refresh(&self, delay: Duration) {
        *self.inner.refresh_delay.lock() = delay;
    }

    /// Every accepted commit, oldest first.
    #[must_use]
    pub fn commit_log(&self) -> Vec<CommitRecord> {
        self.inner.commits.lock().clone()
    }

    /// Targets of every accepted commit, oldest first.
    #[must_use]
    pub fn commits(&self) -> Vec<f64> {
        self.inner.commits.lock().iter().map(|c| c.target_ma).collect()
    }
}

impl DeviceDriver for FixedStatusDriver {
    fn refresh(&self) -> BosResult<Status> {
        if self.inner.fail_refresh.load(Ordering::Acquire) {
            return Err(BosError::Driver("refresh unavailable".into()));
        }
        let delay = *self.inner.refresh_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(*self.inner.status.lock())
    }

    fn commit_current(&self, target_ma: f64, is_floor: bool) -> BosResult<()> {
        if self.inner.fail_commit.load(Ordering::Acquire) {
            return Err(BosError::Driver("commit rejected".into()));
        }
        self.inner.commits.lock().push(CommitRecord {
            target_ma,
            is_floor,
            at_ms: now_ms(),
        });
        self.inner.status.lock().current_ma = target_ma;
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "fixed"
    }
}
