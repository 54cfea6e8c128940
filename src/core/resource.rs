//! The closed set of resource variants and their common entry points.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::aggregate::Aggregate;
use crate::core::driver::Leaf;
use crate::core::event::Event;
use crate::core::event_queue::Reservation;
use crate::core::partition::{Partition, PartitionChild};
use crate::core::request::ScheduleRequest;
use crate::core::status::{RefreshMode, Status};
use crate::core::{BosError, BosResult};

/// Variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Backed by a device driver.
    Leaf,
    /// Fan-in over several parents.
    Aggregate,
    /// Hidden fan-out manager.
    Partition,
    /// One share of a partitioned source.
    PartitionChild,
}

/// A named resource in the directory.
#[derive(Debug)]
pub enum Resource {
    /// Physical resource.
    Leaf(Leaf),
    /// Aggregate composition.
    Aggregate(Aggregate),
    /// Partition manager.
    Partition(Partition),
    /// Partition child, served by its manager.
    PartitionChild(PartitionChild),
}

/// A non-owning reference from a composite to another resource.
#[derive(Debug, Clone)]
pub struct ResourceLink {
    /// Name of the referenced resource.
    pub name: String,
    resource: Weak<Resource>,
}

impl ResourceLink {
    /// Link to `resource`.
    #[must_use]
    pub fn new(resource: &Arc<Resource>) -> Self {
        Self {
            name: resource.name().to_string(),
            resource: Arc::downgrade(resource),
        }
    }

    /// Resolve the link.
    ///
    /// # Errors
    ///
    /// `ResourceGone` once the referenced resource has been dropped.
    pub fn upgrade(&self) -> BosResult<Arc<Resource>> {
        self.resource
            .upgrade()
            .ok_or_else(|| BosError::ResourceGone(self.name.clone()))
    }
}

impl Resource {
    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf(leaf) => leaf.name(),
            Self::Aggregate(agg) => agg.name(),
            Self::Partition(part) => part.name(),
            Self::PartitionChild(child) => child.name(),
        }
    }

    /// Variant tag.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Leaf(_) => ResourceKind::Leaf,
            Self::Aggregate(_) => ResourceKind::Aggregate,
            Self::Partition(_) => ResourceKind::Partition,
            Self::PartitionChild(_) => ResourceKind::PartitionChild,
        }
    }

    /// Current status.
    ///
    /// # Errors
    ///
    /// Partition children fail if their manager or source is gone.
    pub fn get_status(&self) -> BosResult<Status> {
        match self {
            Self::Leaf(leaf) => Ok(leaf.get_status()),
            Self::Aggregate(agg) => Ok(agg.get_status()),
            Self::Partition(part) => Ok(part.get_status()),
            Self::PartitionChild(child) => child.get_status(),
        }
    }

    /// Reserve a current over a window.
    ///
    /// # Errors
    ///
    /// `InvalidWindow`, `OutOfRange`, `ForwardFailed`, or `Unsupported` when
    /// called on a partition manager.
    pub fn schedule(&self, request: &ScheduleRequest) -> BosResult<()> {
        match self {
            Self::Leaf(leaf) => leaf.schedule(request).map(|_| ()),
            Self::Aggregate(agg) => agg.schedule(request),
            Self::Partition(part) => Err(BosError::Unsupported(format!(
                "{} is a partition manager; schedule on one of its children",
                part.name()
            ))),
            Self::PartitionChild(child) => child.schedule(request),
        }
    }

    /// Stop the resource's scheduler thread, if it has one.
    pub fn quit(&self) {
        match self {
            Self::Leaf(leaf) => leaf.quit(),
            Self::Aggregate(agg) => agg.scheduler().quit(),
            Self::Partition(part) => part.scheduler().quit(),
            Self::PartitionChild(_) => {}
        }
    }

    /// Switch between LAZY and ACTIVE refresh.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid combination, `Unsupported` on partition children.
    pub fn set_refresh_mode(&self, mode: RefreshMode) -> BosResult<()> {
        match self {
            Self::Leaf(leaf) => leaf.set_refresh_mode(mode),
            Self::Aggregate(agg) => agg.scheduler().set_refresh_mode(mode),
            Self::Partition(part) => part.scheduler().set_refresh_mode(mode),
            Self::PartitionChild(child) => Err(unsupported_on_child(child)),
        }
    }

    /// Change the staleness bound.
    ///
    /// # Errors
    ///
    /// As [`Resource::set_refresh_mode`].
    pub fn set_max_staleness(&self, max_staleness: Duration) -> BosResult<()> {
        match self {
            Self::Leaf(leaf) => leaf.set_max_staleness(max_staleness),
            Self::Aggregate(agg) => agg.scheduler().set_max_staleness(max_staleness),
            Self::Partition(part) => part.scheduler().set_max_staleness(max_staleness),
            Self::PartitionChild(child) => Err(unsupported_on_child(child)),
        }
    }

    /// Refresh immediately, bypassing the staleness check.
    ///
    /// # Errors
    ///
    /// Partition children fail if their manager or source is gone.
    pub fn manual_refresh(&self) -> BosResult<Status> {
        match self {
            Self::Leaf(leaf) => Ok(leaf.manual_refresh()),
            Self::Aggregate(agg) => Ok(agg.scheduler().manual_refresh()),
            Self::Partition(part) => Ok(part.scheduler().manual_refresh()),
            Self::PartitionChild(child) => child.get_status(),
        }
    }

    /// Events still queued for this resource.
    #[must_use]
    pub fn pending_events(&self) -> Vec<Event> {
        match self {
            Self::Leaf(leaf) => leaf.pending_events(),
            Self::Aggregate(agg) => agg.scheduler().pending_events(),
            Self::Partition(part) => part.scheduler().pending_events(),
            Self::PartitionChild(child) => child.pending_events(),
        }
    }

    /// Live reservations held for this resource.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        match self {
            Self::Leaf(leaf) => leaf.reservations(),
            Self::Aggregate(agg) => agg.scheduler().reservations(),
            Self::Partition(part) => part.scheduler().reservations(),
            Self::PartitionChild(child) => child.reservations(),
        }
    }

    /// Net current last committed for this resource.
    #[must_use]
    pub fn committed_current(&self) -> f64 {
        match self {
            Self::Leaf(leaf) => leaf.committed_current(),
            Self::Aggregate(agg) => agg.scheduler().committed_current(),
            Self::Partition(part) => part.scheduler().committed_current(),
            Self::PartitionChild(child) => child.committed_current(),
        }
    }
}

fn unsupported_on_child(child: &PartitionChild) -> BosError {
    BosError::Unsupported(format!(
        "{} refreshes through its manager {}",
        child.name(),
        child.manager_name()
    ))
}
