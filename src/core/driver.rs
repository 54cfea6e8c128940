//! Device driver seam.

use std::fmt;

use crate::core::scheduler::{Backend, CommitPlan, Scheduler};
use crate::core::status::Status;
use crate::core::BosResult;

/// The physical layer underneath a leaf resource.
///
/// Both calls may block on I/O. They are only invoked while the owning
/// resource serialises access to its driver, so implementations need no
/// internal locking beyond what `Sync` requires.
pub trait DeviceDriver: Send + Sync + fmt::Debug {
    /// Read a fresh status snapshot.
    fn refresh(&self) -> BosResult<Status>;

    /// Ask the hardware to move to `target_ma`.
    fn commit_current(&self, target_ma: f64, is_floor: bool) -> BosResult<()>;

    /// Short label for logs.
    fn type_name(&self) -> &'static str {
        "driver"
    }
}

impl<D: DeviceDriver + ?Sized> DeviceDriver for Box<D> {
    fn refresh(&self) -> BosResult<Status> {
        (**self).refresh()
    }

    fn commit_current(&self, target_ma: f64, is_floor: bool) -> BosResult<()> {
        (**self).commit_current(target_ma, is_floor)
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}

/// Scheduler backend that talks to a [`DeviceDriver`].
#[derive(Debug)]
pub struct DriverBackend {
    driver: Box<dyn DeviceDriver>,
}

impl DriverBackend {
    /// Wrap a driver.
    #[must_use]
    pub fn new(driver: Box<dyn DeviceDriver>) -> Self {
        Self { driver }
    }

    /// The wrapped driver.
    #[must_use]
    pub fn driver(&self) -> &dyn DeviceDriver {
        self.driver.as_ref()
    }
}

impl Backend for DriverBackend {
    fn refresh(&self) -> BosResult<Status> {
        self.driver.refresh()
    }

    fn commit(&self, plan: &CommitPlan) -> BosResult<()> {
        self.driver.commit_current(plan.total_ma, plan.is_floor)
    }
}

/// A physical resource: a scheduler driving a device.
pub type Leaf = Scheduler<DriverBackend>;
