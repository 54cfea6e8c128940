//! Fan-out composition: one source split into several children.
//!
//! Only the source is measured. Each child's charge is inferred by coulomb
//! counting its requested current, and the policy decides how the estimates
//! are reconciled with the source's measured fields:
//!
//! * [`PartitionPolicy::Proportional`] renormalises every estimate so that the
//!   children add up to the source exactly.
//! * [`PartitionPolicy::Tranche`] and [`PartitionPolicy::Reservation`] keep
//!   the raw estimates and push the whole discrepancy onto one child (first
//!   or last), cascading whatever the clamp cuts off to the next one.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ResourceConfig;
use crate::core::event::Event;
use crate::core::event_queue::Reservation;
use crate::core::request::ScheduleRequest;
use crate::core::resource::{Resource, ResourceLink};
use crate::core::scale::Scale;
use crate::core::scheduler::{Backend, CommitPlan, Scheduler, CURRENT_EPSILON_MA};
use crate::core::sequence::SequenceSource;
use crate::core::status::Status;
use crate::core::{BosError, BosResult};
use crate::util::clock::{hours_between, now_ms};

/// How a partition reconciles child estimates with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Renormalise against the source.
    Proportional,
    /// Discrepancy goes to the first child first.
    Tranche,
    /// Discrepancy goes to the last child first.
    Reservation,
}

/// Book-keeping for one child.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildAccount {
    /// Child name.
    pub name: String,
    /// Share of the source.
    pub scale: Scale,
    /// Inferred state of charge, mAh.
    pub estimated_mah: f64,
    /// Net current currently requested by the child, mA.
    pub requested_ma: f64,
    /// Last time the estimate was integrated.
    pub last_update_ms: u128,
}

impl ChildAccount {
    /// Fresh account starting at `estimated_mah`.
    #[must_use]
    pub fn new(name: impl Into<String>, scale: Scale, estimated_mah: f64, now_ms: u128) -> Self {
        Self {
            name: name.into(),
            scale,
            estimated_mah,
            requested_ma: 0.0,
            last_update_ms: now_ms,
        }
    }

    /// Integrate the requested current up to `now_ms`.
    pub fn settle(&mut self, now_ms: u128) {
        self.estimated_mah -= self.requested_ma * hours_between(self.last_update_ms, now_ms);
        self.last_update_ms = self.last_update_ms.max(now_ms);
    }

    /// Settle, then switch to a new requested current.
    pub fn set_requested(&mut self, requested_ma: f64, now_ms: u128) {
        self.settle(now_ms);
        self.requested_ma = requested_ma;
    }
}

/// Per-child statuses for `policy` given the source's measured status.
///
/// Proportional renormalisation writes the renormalised estimates back.
pub fn apportion(policy: PartitionPolicy, source: &Status, accounts: &mut [ChildAccount]) -> Vec<Status> {
    match policy {
        PartitionPolicy::Proportional => proportional(source, accounts),
        PartitionPolicy::Tranche => {
            let order: Vec<usize> = (0..accounts.len()).collect();
            prioritised(source, accounts, &order)
        }
        PartitionPolicy::Reservation => {
            let order: Vec<usize> = (0..accounts.len()).rev().collect();
            prioritised(source, accounts, &order)
        }
    }
}

fn scaled_limits(source: &Status, scale: &Scale) -> (f64, f64, f64) {
    (
        source.max_capacity_mah * scale.max_capacity,
        source.max_charge_current_ma * scale.max_charge,
        source.max_discharge_current_ma * scale.max_discharge,
    )
}

fn proportional(source: &Status, accounts: &mut [ChildAccount]) -> Vec<Status> {
    let mut total: f64 = accounts.iter().map(|a| a.estimated_mah).sum();
    if total.abs() <= CURRENT_EPSILON_MA && source.capacity_mah > CURRENT_EPSILON_MA {
        warn!(
            source_capacity_mah = source.capacity_mah,
            "child estimates collapsed, resetting from scales"
        );
        for a in accounts.iter_mut() {
            a.estimated_mah = source.capacity_mah * a.scale.capacity;
        }
        total = accounts.iter().map(|a| a.estimated_mah).sum();
    }

    let net: f64 = accounts.iter().map(|a| a.requested_ma).sum();
    let positive: f64 = accounts.iter().map(|a| a.requested_ma.max(0.0)).sum();
    let negative: f64 = accounts.iter().map(|a| a.requested_ma.min(0.0)).sum();

    accounts
        .iter_mut()
        .map(|a| {
            let capacity = if total.abs() > CURRENT_EPSILON_MA {
                a.estimated_mah / total * source.capacity_mah
            } else {
                0.0
            };
            a.estimated_mah = capacity;

            let share = if net.abs() > CURRENT_EPSILON_MA {
                a.requested_ma / net
            } else if source.current_ma >= 0.0 && positive > CURRENT_EPSILON_MA {
                a.requested_ma.max(0.0) / positive
            } else if source.current_ma < 0.0 && negative < -CURRENT_EPSILON_MA {
                a.requested_ma.min(0.0) / negative
            } else {
                0.0
            };

            let (max_capacity, max_charge, max_discharge) = scaled_limits(source, &a.scale);
            Status {
                voltage_mv: source.voltage_mv,
                current_ma: source.current_ma * share,
                capacity_mah: capacity,
                max_capacity_mah: max_capacity,
                max_charge_current_ma: max_charge,
                max_discharge_current_ma: max_discharge,
                timestamp_ms: source.timestamp_ms,
            }
        })
        .collect()
}

/// Add `correction` to `values` in priority `order`, clamping each to its
/// bounds and carrying the clipped remainder to the next. Returns what could
/// not be placed.
fn cascade(values: &mut [f64], bounds: &[(f64, f64)], correction: f64, order: &[usize]) -> f64 {
    let mut remaining = correction;
    for &i in order {
        if remaining.abs() <= CURRENT_EPSILON_MA {
            break;
        }
        let (lo, hi) = bounds[i];
        let wanted = values[i] + remaining;
        let clamped = wanted.clamp(lo, hi.max(lo));
        remaining = wanted - clamped;
        values[i] = clamped;
    }
    remaining
}

fn correct(values: &mut [f64], bounds: &[(f64, f64)], target: f64, order: &[usize], field: &str) {
    let correction = target - values.iter().sum::<f64>();
    let leftover = cascade(values, bounds, correction, order);
    if leftover.abs() > CURRENT_EPSILON_MA {
        debug!(field, leftover, "correction could not be fully placed");
    }
}

fn prioritised(source: &Status, accounts: &[ChildAccount], order: &[usize]) -> Vec<Status> {
    let caps: Vec<(f64, f64, f64)> = accounts.iter().map(|a| scaled_limits(source, &a.scale)).collect();

    let mut max_charge: Vec<f64> = caps.iter().map(|c| c.1).collect();
    let charge_bounds: Vec<(f64, f64)> = caps.iter().map(|c| (0.0, c.1)).collect();
    correct(&mut max_charge, &charge_bounds, source.max_charge_current_ma, order, "max_charge");

    let mut max_discharge: Vec<f64> = caps.iter().map(|c| c.2).collect();
    let discharge_bounds: Vec<(f64, f64)> = caps.iter().map(|c| (0.0, c.2)).collect();
    correct(
        &mut max_discharge,
        &discharge_bounds,
        source.max_discharge_current_ma,
        order,
        "max_discharge",
    );

    let mut capacity: Vec<f64> = accounts.iter().map(|a| a.estimated_mah).collect();
    let capacity_bounds: Vec<(f64, f64)> = caps.iter().map(|c| (0.0, c.0)).collect();
    // raw estimates may already sit outside their bounds
    for (v, (lo, hi)) in capacity.iter_mut().zip(&capacity_bounds) {
        *v = v.clamp(*lo, hi.max(*lo));
    }
    correct(&mut capacity, &capacity_bounds, source.capacity_mah, order, "capacity");

    let mut current: Vec<f64> = accounts.iter().map(|a| a.requested_ma).collect();
    let current_bounds: Vec<(f64, f64)> = max_charge
        .iter()
        .zip(&max_discharge)
        .map(|(c, d)| (-c, *d))
        .collect();
    correct(&mut current, &current_bounds, source.current_ma, order, "current");

    (0..accounts.len())
        .map(|i| Status {
            voltage_mv: source.voltage_mv,
            current_ma: current[i],
            capacity_mah: capacity[i],
            max_capacity_mah: caps[i].0,
            max_charge_current_ma: max_charge[i],
            max_discharge_current_ma: max_discharge[i],
            timestamp_ms: source.timestamp_ms,
        })
        .collect()
}

/// Scheduler backend of a partition manager.
#[derive(Debug)]
pub struct PartitionBackend {
    name: String,
    policy: PartitionPolicy,
    source: ResourceLink,
    accounts: Mutex<Vec<ChildAccount>>,
}

impl PartitionBackend {
    fn source_status(&self) -> BosResult<Status> {
        self.source.upgrade()?.get_status()
    }

    /// Source status plus every child's apportioned status.
    ///
    /// # Errors
    ///
    /// Whatever the source's status query returns.
    pub fn statuses(&self) -> BosResult<(Status, Vec<(String, Status)>)> {
        let source = self.source_status()?;
        let now = now_ms();
        let mut accounts = self.accounts.lock();
        for a in accounts.iter_mut() {
            a.settle(now);
        }
        let statuses = apportion(self.policy, &source, &mut accounts);
        let named = accounts.iter().map(|a| a.name.clone()).zip(statuses).collect();
        Ok((source, named))
    }
}

impl Backend for PartitionBackend {
    fn refresh(&self) -> BosResult<Status> {
        self.statuses().map(|(source, _)| source)
    }

    fn commit(&self, plan: &CommitPlan) -> BosResult<()> {
        let now = now_ms();
        let mut accounts = self.accounts.lock();
        for a in accounts.iter_mut() {
            let requested = plan.by_owner.get(&a.name).copied().unwrap_or(0.0);
            if (requested - a.requested_ma).abs() > CURRENT_EPSILON_MA {
                debug!(manager = %self.name, child = %a.name, requested_ma = requested, "child current changed");
            }
            a.set_requested(requested, now);
        }
        Ok(())
    }

    fn needs_commit(&self, committed: &CommitPlan, next: &CommitPlan) -> bool {
        next.differs_by_owner(committed)
    }
}

/// Lead applied when re-forwarding an old window that has already begun.
const RETRACT_LEAD_MS: u128 = 5;

/// Hidden resource that manages one partitioned source.
#[derive(Debug)]
pub struct Partition {
    scheduler: Scheduler<PartitionBackend>,
    forwarding: Mutex<()>,
}

impl Partition {
    /// Create a manager over `source` with one account per child.
    ///
    /// Estimates start at the source's capacity times each child's capacity
    /// share.
    ///
    /// # Errors
    ///
    /// `InvalidScale` or `Config`.
    pub fn new(
        name: impl Into<String>,
        policy: PartitionPolicy,
        source: ResourceLink,
        source_status: &Status,
        children: &[(String, Scale)],
        config: ResourceConfig,
        sequences: Arc<dyn SequenceSource>,
    ) -> BosResult<Self> {
        let scales: Vec<Scale> = children.iter().map(|(_, s)| *s).collect();
        Scale::validate_set(&scales)?;
        let now = now_ms();
        let accounts = children
            .iter()
            .map(|(child, scale)| {
                ChildAccount::new(child.clone(), *scale, source_status.capacity_mah * scale.capacity, now)
            })
            .collect();
        let name = name.into();
        let backend = PartitionBackend {
            name: name.clone(),
            policy,
            source,
            accounts: Mutex::new(accounts),
        };
        Ok(Self {
            scheduler: Scheduler::spawn(name, backend, config, sequences)?,
            forwarding: Mutex::new(()),
        })
    }

    /// Manager name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.scheduler.name()
    }

    /// Underlying scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<PartitionBackend> {
        &self.scheduler
    }

    /// Allocation policy.
    #[must_use]
    pub fn policy(&self) -> PartitionPolicy {
        self.scheduler.backend().policy
    }

    /// Name of the partitioned source.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.scheduler.backend().source.name
    }

    /// Child names in priority order.
    #[must_use]
    pub fn child_names(&self) -> Vec<String> {
        self.scheduler
            .backend()
            .accounts
            .lock()
            .iter()
            .map(|a| a.name.clone())
            .collect()
    }

    /// Snapshot of the child accounts.
    #[must_use]
    pub fn accounts(&self) -> Vec<ChildAccount> {
        self.scheduler.backend().accounts.lock().clone()
    }

    fn has_child(&self, child: &str) -> bool {
        self.scheduler
            .backend()
            .accounts
            .lock()
            .iter()
            .any(|a| a.name == child)
    }

    /// The source's status as seen by the manager.
    pub fn get_status(&self) -> Status {
        self.scheduler.get_status()
    }

    /// Apportioned status of one child.
    ///
    /// # Errors
    ///
    /// `UnknownName` or the source's failure.
    pub fn get_status_of(&self, child: &str) -> BosResult<Status> {
        let (_, statuses) = self.scheduler.backend().statuses()?;
        statuses
            .into_iter()
            .find(|(name, _)| name == child)
            .map(|(_, status)| status)
            .ok_or_else(|| BosError::UnknownName(child.to_string()))
    }

    /// Reserve current for `child`.
    ///
    /// The manager previews the queue with the new reservation merged in,
    /// forwards the resulting total to the source at `start` and at every
    /// reservation edge inside the window, and only then records the
    /// reservation locally. Forwards use the manager as requester and a fresh
    /// sequence number. When `request` updates a reservation of the same
    /// child, the window forwarded also spans the old reservation so the
    /// source drops what it no longer carries.
    ///
    /// Calls are serialised per manager from preview to enqueue, so sibling
    /// requests always see each other's reservations.
    ///
    /// # Errors
    ///
    /// `InvalidWindow`, `UnknownName`, `OutOfRange` or `ForwardFailed`.
    pub fn schedule_for(&self, child: &str, request: &ScheduleRequest) -> BosResult<()> {
        request.check_window(now_ms())?;
        if !self.has_child(child) {
            return Err(BosError::UnknownName(child.to_string()));
        }
        if request.requester == child {
            let status = self.get_status_of(child)?;
            if !status.admits(request.target_ma) {
                warn!(manager = %self.name(), child, target_ma = request.target_ma, "request exceeds child limit");
                return Err(BosError::OutOfRange {
                    requested: request.target_ma.abs(),
                    limit: status.limit_for(request.target_ma),
                });
            }
        }

        let _forwarding = self.forwarding.lock();
        let (end_ms, totals) = self.scheduler.with_queue(|queue| {
            // an update moves the reservation; its old window is re-forwarded too
            let (start_ms, end_ms) = match queue.reservation(request.sequence) {
                Some(old) if old.owner == child => (
                    old.begin_ms
                        .max(now_ms() + RETRACT_LEAD_MS)
                        .min(request.start_ms),
                    old.end_ms.max(request.end_ms),
                ),
                _ => (request.start_ms, request.end_ms),
            };
            let mut preview = queue.clone();
            preview.merge(request, child);
            let points: BTreeSet<u128> = [start_ms, request.start_ms]
                .into_iter()
                .chain(preview.edges_within(start_ms, end_ms, |_| true))
                .collect();
            let totals: Vec<(u128, f64)> = points
                .into_iter()
                .map(|t| (t, preview.level_at(t, |_| true)))
                .collect();
            (end_ms, totals)
        });

        let backend = self.scheduler.backend();
        let source = backend.source.upgrade()?;
        for (start_ms, total_ma) in totals {
            let forward = ScheduleRequest {
                target_ma: total_ma,
                is_floor: request.is_floor,
                start_ms,
                end_ms,
                requester: self.name().to_string(),
                sequence: self.scheduler.sequences().next(),
            };
            debug!(
                manager = %self.name(),
                child,
                start_ms,
                total_ma,
                "forwarding total to source"
            );
            source.schedule(&forward).map_err(|e| {
                warn!(manager = %self.name(), source = %backend.source.name, error = %e, "source rejected total");
                BosError::forward(&backend.source.name, &e)
            })?;
        }

        self.scheduler.enqueue(request, child);
        Ok(())
    }
}

/// A child of a partition. It has no scheduler of its own; status and
/// schedule calls are served by the manager.
#[derive(Debug)]
pub struct PartitionChild {
    name: String,
    manager: ResourceLink,
}

impl PartitionChild {
    /// Child `name` served by `manager`.
    #[must_use]
    pub fn new(name: impl Into<String>, manager: ResourceLink) -> Self {
        Self {
            name: name.into(),
            manager,
        }
    }

    /// Child name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manager name.
    #[must_use]
    pub fn manager_name(&self) -> &str {
        &self.manager.name
    }

    fn with_manager<R>(&self, f: impl FnOnce(&Partition) -> BosResult<R>) -> BosResult<R> {
        let manager = self.manager.upgrade()?;
        match manager.as_ref() {
            Resource::Partition(partition) => f(partition),
            other => Err(BosError::Unsupported(format!(
                "{} is not a partition manager",
                other.name()
            ))),
        }
    }

    /// Status apportioned by the manager.
    ///
    /// # Errors
    ///
    /// `ResourceGone` if the manager was removed.
    pub fn get_status(&self) -> BosResult<Status> {
        self.with_manager(|p| p.get_status_of(&self.name))
    }

    /// Schedule through the manager.
    ///
    /// # Errors
    ///
    /// See [`Partition::schedule_for`].
    pub fn schedule(&self, request: &ScheduleRequest) -> BosResult<()> {
        self.with_manager(|p| p.schedule_for(&self.name, request))
    }

    /// Manager events owned by this child.
    #[must_use]
    pub fn pending_events(&self) -> Vec<Event> {
        self.with_manager(|p| {
            Ok(p.scheduler()
                .pending_events()
                .into_iter()
                .filter(|e| e.owner == self.name)
                .collect())
        })
        .unwrap_or_default()
    }

    /// Manager reservations owned by this child.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        self.with_manager(|p| {
            Ok(p.scheduler()
                .reservations()
                .into_iter()
                .filter(|r| r.owner == self.name)
                .collect())
        })
        .unwrap_or_default()
    }

    /// Net current last committed for this child.
    #[must_use]
    pub fn committed_current(&self) -> f64 {
        self.with_manager(|p| Ok(p.scheduler().committed().by_owner.get(&self.name).copied().unwrap_or(0.0)))
            .unwrap_or(0.0)
    }
}
