//! Fan-in composition: several parents presented as one battery.
//!
//! The aggregate runs every parent at a common C-rate, the smallest effective
//! rate among them, so that no parent is asked to exceed its own limits when
//! a request is split by headroom.

use std::sync::Arc;
use std::thread;

use tracing::{debug, trace, warn};

use crate::config::AggregateConfig;
use crate::core::request::ScheduleRequest;
use crate::core::resource::{Resource, ResourceLink};
use crate::core::scheduler::{Backend, CommitPlan, Scheduler, CURRENT_EPSILON_MA};
use crate::core::sequence::SequenceSource;
use crate::core::status::Status;
use crate::core::{BosError, BosResult};

/// Combined view of a set of parents.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSnapshot {
    /// Status reported for the aggregate.
    pub status: Status,
    /// Common C-rate (1/h).
    pub rate: f64,
    /// Sum of the parents' charge limits before scaling.
    pub raw_max_charge_ma: f64,
    /// Sum of the parents' discharge limits before scaling.
    pub raw_max_discharge_ma: f64,
    /// Indices of parents whose voltage is outside the tolerance band.
    pub out_of_band: Vec<usize>,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        f64::INFINITY
    } else {
        numerator / denominator
    }
}

/// A parent's effective C-rate: the tighter of its charge and discharge rates.
#[must_use]
pub fn effective_rate(status: &Status) -> f64 {
    let charge = ratio(status.max_charge_current_ma, status.charge_headroom());
    let discharge = ratio(status.max_discharge_current_ma, status.discharge_headroom());
    charge.min(discharge)
}

/// Smallest effective rate across parents; zero when none is finite.
#[must_use]
pub fn common_rate(parents: &[Status]) -> f64 {
    let rate = parents
        .iter()
        .map(effective_rate)
        .fold(f64::INFINITY, f64::min);
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

fn weighted_voltage(parents: &[Status], weight: impl Fn(&Status) -> f64) -> Option<f64> {
    let total: f64 = parents.iter().map(&weight).sum();
    (total > 0.0).then(|| parents.iter().map(|s| s.voltage_mv * weight(s)).sum::<f64>() / total)
}

/// Combine parent snapshots into the aggregate's status.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn combine(parents: &[Status], voltage_tolerance_mv: f64) -> AggregateSnapshot {
    let rate = common_rate(parents);
    let sum = |f: fn(&Status) -> f64| parents.iter().map(f).sum::<f64>();

    let mean_voltage = if parents.is_empty() {
        0.0
    } else {
        sum(|s| s.voltage_mv) / parents.len() as f64
    };
    // charge side when anything can still charge, otherwise discharge side
    let voltage_mv = weighted_voltage(parents, Status::charge_headroom)
        .or_else(|| weighted_voltage(parents, Status::discharge_headroom))
        .unwrap_or(mean_voltage);

    let out_of_band = parents
        .iter()
        .enumerate()
        .filter(|(_, s)| (s.voltage_mv - mean_voltage).abs() > voltage_tolerance_mv)
        .map(|(i, _)| i)
        .collect();

    let status = Status {
        voltage_mv,
        current_ma: sum(|s| s.current_ma),
        capacity_mah: sum(|s| s.capacity_mah),
        max_capacity_mah: sum(|s| s.max_capacity_mah),
        max_charge_current_ma: sum(Status::charge_headroom) * rate,
        max_discharge_current_ma: sum(Status::discharge_headroom) * rate,
        timestamp_ms: parents.iter().map(|s| s.timestamp_ms).max().unwrap_or(0),
    };

    AggregateSnapshot {
        status,
        rate,
        raw_max_charge_ma: sum(|s| s.max_charge_current_ma),
        raw_max_discharge_ma: sum(|s| s.max_discharge_current_ma),
        out_of_band,
    }
}

/// Split `target_ma` across parents in proportion to their scaled headroom.
///
/// Positive targets are split by discharge headroom, negative ones by charge
/// headroom.
///
/// # Errors
///
/// `OutOfRange` when a non-zero target meets zero total headroom.
#[allow(clippy::cast_precision_loss)]
pub fn split_target(parents: &[Status], target_ma: f64) -> BosResult<Vec<f64>> {
    let rate = common_rate(parents);
    let weights: Vec<f64> = parents
        .iter()
        .map(|s| {
            let headroom = if target_ma >= 0.0 {
                s.discharge_headroom()
            } else {
                s.charge_headroom()
            };
            headroom * rate
        })
        .collect();
    let total: f64 = weights.iter().sum();

    if total <= CURRENT_EPSILON_MA {
        if target_ma.abs() > CURRENT_EPSILON_MA {
            return Err(BosError::OutOfRange {
                requested: target_ma.abs(),
                limit: 0.0,
            });
        }
        let n = parents.len().max(1) as f64;
        return Ok(vec![target_ma / n; parents.len()]);
    }

    Ok(weights.iter().map(|w| target_ma * w / total).collect())
}

/// Scheduler backend of an aggregate.
#[derive(Debug)]
pub struct AggregateBackend {
    name: String,
    parents: Vec<ResourceLink>,
    voltage_tolerance_mv: f64,
}

impl AggregateBackend {
    /// Query every parent concurrently.
    ///
    /// # Errors
    ///
    /// The first parent failure, or `ResourceGone`.
    pub fn parent_statuses(&self) -> BosResult<Vec<Status>> {
        let resources = self
            .parents
            .iter()
            .map(ResourceLink::upgrade)
            .collect::<BosResult<Vec<Arc<Resource>>>>()?;

        thread::scope(|scope| {
            let handles: Vec<_> = resources
                .iter()
                .map(|parent| scope.spawn(move || parent.get_status()))
                .collect();
            handles
                .into_iter()
                .zip(&self.parents)
                .map(|(handle, link)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(BosError::Driver(format!("status query for {} panicked", link.name)))
                    })
                })
                .collect()
        })
    }

    /// Fresh combined snapshot.
    ///
    /// # Errors
    ///
    /// See [`AggregateBackend::parent_statuses`].
    pub fn snapshot(&self) -> BosResult<AggregateSnapshot> {
        let parents = self.parent_statuses()?;
        let snapshot = combine(&parents, self.voltage_tolerance_mv);
        for &i in &snapshot.out_of_band {
            warn!(
                name = %self.name,
                parent = %self.parents[i].name,
                voltage_mv = parents[i].voltage_mv,
                tolerance_mv = self.voltage_tolerance_mv,
                "parent voltage outside tolerance band"
            );
        }
        Ok(snapshot)
    }
}

impl Backend for AggregateBackend {
    fn refresh(&self) -> BosResult<Status> {
        self.snapshot().map(|s| s.status)
    }

    fn commit(&self, plan: &CommitPlan) -> BosResult<()> {
        // parents were driven when the request was forwarded
        trace!(name = %self.name, total_ma = plan.total_ma, "aggregate net current");
        Ok(())
    }
}

/// Fan-in composition over several parents.
#[derive(Debug)]
pub struct Aggregate {
    scheduler: Scheduler<AggregateBackend>,
}

impl Aggregate {
    /// Create an aggregate and start its scheduler.
    ///
    /// # Errors
    ///
    /// `Config` for an empty parent list or invalid configuration.
    pub fn new(
        name: impl Into<String>,
        parents: Vec<ResourceLink>,
        config: &AggregateConfig,
        sequences: Arc<dyn SequenceSource>,
    ) -> BosResult<Self> {
        if parents.is_empty() {
            return Err(BosError::Config("aggregate needs at least one parent".into()));
        }
        let name = name.into();
        let backend = AggregateBackend {
            name: name.clone(),
            parents,
            voltage_tolerance_mv: config.voltage_tolerance_mv,
        };
        let scheduler = Scheduler::spawn(name, backend, config.resource, sequences)?;
        Ok(Self { scheduler })
    }

    /// Aggregate name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.scheduler.name()
    }

    /// Underlying scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<AggregateBackend> {
        &self.scheduler
    }

    /// Names of the parents in split order.
    #[must_use]
    pub fn parent_names(&self) -> Vec<String> {
        self.scheduler
            .backend()
            .parents
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Cached or lazily refreshed status.
    pub fn get_status(&self) -> Status {
        self.scheduler.get_status()
    }

    /// Fresh snapshot including unscaled limits.
    ///
    /// # Errors
    ///
    /// See [`AggregateBackend::parent_statuses`].
    pub fn snapshot(&self) -> BosResult<AggregateSnapshot> {
        self.scheduler.backend().snapshot()
    }

    /// Split `request` across the parents and forward each share.
    ///
    /// Forwards keep the caller's requester and sequence. The first rejected
    /// forward aborts with `ForwardFailed`; shares already forwarded stay in
    /// place.
    ///
    /// # Errors
    ///
    /// `InvalidWindow`, `OutOfRange` or `ForwardFailed`.
    pub fn schedule(&self, request: &ScheduleRequest) -> BosResult<()> {
        self.scheduler.admit(request)?;

        let backend = self.scheduler.backend();
        let statuses = backend.parent_statuses()?;
        let shares = split_target(&statuses, request.target_ma)?;

        for (link, share) in backend.parents.iter().zip(shares) {
            let parent = link.upgrade()?;
            debug!(
                name = %self.name(),
                parent = %link.name,
                share_ma = share,
                seq = request.sequence,
                "forwarding share"
            );
            parent.schedule(&request.with_target(share)).map_err(|e| {
                warn!(name = %self.name(), parent = %link.name, error = %e, "parent rejected share");
                BosError::forward(&link.name, &e)
            })?;
        }

        self.scheduler.enqueue(request, &request.requester);
        Ok(())
    }
}
