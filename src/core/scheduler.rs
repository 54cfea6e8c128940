//! Per-resource background scheduler.
//!
//! Every scheduled resource owns one [`Scheduler`]: a cached [`Status`], an
//! [`EventQueue`] and one dedicated OS thread. The thread sleeps at exactly two
//! points, waiting on its control channel while the queue is empty and waiting
//! with a timeout until the earliest queued event otherwise. Both waits observe
//! [`Control::Quit`].
//!
//! All events due in one wake-up are drained as a batch; the resource's
//! [`Backend`] then sees at most one commit for the whole batch.
//!
//! Two locks are involved. The state lock guards status, configuration and
//! queue and is never held while calling into the backend. The I/O lock
//! serialises backend calls so that a LAZY read and a background drain never
//! talk to the same device concurrently.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::ResourceConfig;
use crate::core::event::Event;
use crate::core::event_queue::{EventQueue, Reservation};
use crate::core::merge::MergeOutcome;
use crate::core::request::ScheduleRequest;
use crate::core::sequence::SequenceSource;
use crate::core::status::{RefreshMode, Status};
use crate::core::{BosError, BosResult};
use crate::util::clock::{after, now_ms, until};

/// Currents closer than this are treated as equal.
pub const CURRENT_EPSILON_MA: f64 = 1e-6;

/// The net command derived from the active reservations after a drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitPlan {
    /// Sum of all active magnitudes.
    pub total_ma: f64,
    /// Active magnitude per owner.
    pub by_owner: BTreeMap<String, f64>,
    /// Floor flag to pass to the device.
    pub is_floor: bool,
}

impl CommitPlan {
    /// Plan implied by the queue's active reservations.
    #[must_use]
    pub fn from_queue(queue: &EventQueue) -> Self {
        Self {
            total_ma: queue.net_current(),
            by_owner: queue.net_by_owner(),
            is_floor: queue.active_floor(),
        }
    }

    /// Net current differs.
    #[must_use]
    pub fn differs_in_total(&self, other: &Self) -> bool {
        (self.total_ma - other.total_ma).abs() > CURRENT_EPSILON_MA
    }

    /// Some owner's net current differs. Missing owners count as zero.
    #[must_use]
    pub fn differs_by_owner(&self, other: &Self) -> bool {
        let level = |plan: &Self, owner: &str| plan.by_owner.get(owner).copied().unwrap_or(0.0);
        self.by_owner
            .keys()
            .chain(other.by_owner.keys())
            .any(|owner| (level(self, owner) - level(other, owner)).abs() > CURRENT_EPSILON_MA)
    }
}

/// What a scheduler drives: a device driver or a composition policy.
pub trait Backend: Send + Sync + 'static {
    /// Produce a fresh status snapshot.
    fn refresh(&self) -> BosResult<Status>;

    /// Apply a new net command.
    fn commit(&self, plan: &CommitPlan) -> BosResult<()>;

    /// Whether `next` must be committed given what was committed last.
    fn needs_commit(&self, committed: &CommitPlan, next: &CommitPlan) -> bool {
        next.differs_in_total(committed)
    }
}

/// Control messages for the scheduler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// The queue changed; recompute the next deadline.
    Wake,
    /// Stop the thread.
    Quit,
}

#[derive(Debug)]
struct SchedulerState {
    status: Status,
    config: ResourceConfig,
    queue: EventQueue,
    committed: CommitPlan,
}

struct Shared<B> {
    name: String,
    backend: B,
    state: Mutex<SchedulerState>,
    io: Mutex<()>,
    sequences: Arc<dyn SequenceSource>,
}

impl<B: Backend> Shared<B> {
    fn refresh_now(&self) -> Status {
        let _io = self.io.lock();
        self.refresh_locked()
    }

    // caller holds the I/O lock
    fn refresh_locked(&self) -> Status {
        match self.backend.refresh() {
            Ok(status) => {
                let status = status.stamped(now_ms());
                self.state.lock().status = status;
                trace!(name = %self.name, current_ma = status.current_ma, "status refreshed");
                status
            }
            Err(e) => {
                warn!(name = %self.name, error = %e, "refresh failed, keeping cached status");
                self.state.lock().status
            }
        }
    }

    fn drain(&self, now: u128) {
        let (refresh, plan) = {
            let mut st = self.state.lock();
            let batch = st.queue.drain_due(now);
            if batch.is_empty() {
                return;
            }
            debug!(
                name = %self.name,
                began = batch.began.len(),
                ended = batch.ended.len(),
                cancelled = batch.cancelled.len(),
                refresh = batch.refresh,
                "drained events"
            );
            let refresh = batch.refresh && st.config.refresh_mode == RefreshMode::Active;
            if refresh {
                let at = after(now, st.config.max_staleness());
                st.queue.push_refresh(at, self.sequences.next());
            }
            let next = CommitPlan::from_queue(&st.queue);
            let plan = self.backend.needs_commit(&st.committed, &next).then_some(next);
            (refresh, plan)
        };

        let _io = self.io.lock();
        if refresh {
            self.refresh_locked();
        }
        if let Some(plan) = plan {
            match self.backend.commit(&plan) {
                Ok(()) => {
                    debug!(name = %self.name, total_ma = plan.total_ma, "committed current");
                    self.state.lock().committed = plan;
                }
                Err(e) => {
                    warn!(name = %self.name, total_ma = plan.total_ma, error = %e, "commit failed");
                }
            }
        }
    }
}

/// Handle to a resource's scheduler thread and state.
pub struct Scheduler<B: Backend> {
    shared: Arc<Shared<B>>,
    control: Sender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
    quitting: AtomicBool,
}

impl<B: Backend> std::fmt::Debug for Scheduler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.shared.name)
            .field("quitting", &self.quitting.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Scheduler<B> {
    /// Start a scheduler thread named `bos-<name>`.
    ///
    /// # Errors
    ///
    /// Returns `BosError::Config` if `config` is invalid and
    /// `BosError::Driver` if the thread cannot be spawned.
    pub fn spawn(
        name: impl Into<String>,
        backend: B,
        config: ResourceConfig,
        sequences: Arc<dyn SequenceSource>,
    ) -> BosResult<Self> {
        config.validate().map_err(BosError::Config)?;
        let name = name.into();

        let shared = Arc::new(Shared {
            name: name.clone(),
            backend,
            state: Mutex::new(SchedulerState {
                status: Status::default(),
                config,
                queue: EventQueue::new(),
                committed: CommitPlan::default(),
            }),
            io: Mutex::new(()),
            sequences,
        });

        if config.refresh_mode == RefreshMode::Active {
            shared.refresh_now();
            let at = after(now_ms(), config.max_staleness());
            let seq = shared.sequences.next();
            shared.state.lock().queue.push_refresh(at, seq);
        }

        let (control, rx) = unbounded();
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("bos-{name}"))
                .spawn(move || run(&shared, &rx))
                .map_err(|e| BosError::Driver(format!("failed to spawn scheduler for {name}: {e}")))?
        };

        info!(
            name = %shared.name,
            mode = ?config.refresh_mode,
            max_staleness_ms = config.max_staleness_ms,
            "scheduler started"
        );

        Ok(Self {
            shared,
            control,
            worker: Mutex::new(Some(worker)),
            quitting: AtomicBool::new(false),
        })
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The driven backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Shared sequence source.
    #[must_use]
    pub fn sequences(&self) -> &Arc<dyn SequenceSource> {
        &self.shared.sequences
    }

    /// Current status.
    ///
    /// ACTIVE resources return the cached snapshot. LAZY resources refresh
    /// synchronously when the snapshot is older than the staleness bound.
    pub fn get_status(&self) -> Status {
        let (cached, stale) = {
            let st = self.shared.state.lock();
            let stale = st.config.refresh_mode == RefreshMode::Lazy
                && now_ms().saturating_sub(st.status.timestamp_ms)
                    > u128::from(st.config.max_staleness_ms);
            (st.status, stale)
        };
        if !stale {
            return cached;
        }
        let _io = self.shared.io.lock();
        // another reader may have refreshed while we waited for the device
        let (cached, max_staleness) = {
            let st = self.shared.state.lock();
            (st.status, u128::from(st.config.max_staleness_ms))
        };
        if cached.timestamp_ms != 0 && now_ms().saturating_sub(cached.timestamp_ms) <= max_staleness {
            return cached;
        }
        self.shared.refresh_locked()
    }

    /// Refresh now regardless of mode and staleness.
    pub fn manual_refresh(&self) -> Status {
        self.shared.refresh_now()
    }

    /// Check window and, for the resource's own requests, the reported limit.
    ///
    /// # Errors
    ///
    /// `InvalidWindow` or `OutOfRange`.
    pub fn admit(&self, request: &ScheduleRequest) -> BosResult<()> {
        request.check_window(now_ms())?;
        if request.requester == self.shared.name {
            let status = self.get_status();
            if !status.admits(request.target_ma) {
                warn!(
                    name = %self.shared.name,
                    target_ma = request.target_ma,
                    "request exceeds reported limit"
                );
                return Err(BosError::OutOfRange {
                    requested: request.target_ma.abs(),
                    limit: status.limit_for(request.target_ma),
                });
            }
        }
        Ok(())
    }

    /// Merge `request` into the queue under `owner` and wake the thread.
    pub fn enqueue(&self, request: &ScheduleRequest, owner: &str) -> MergeOutcome {
        let outcome = self.shared.state.lock().queue.merge(request, owner);
        debug!(
            name = %self.shared.name,
            owner,
            seq = request.sequence,
            magnitude_ma = outcome.magnitude_ma,
            adjusted = outcome.actions.len(),
            "reservation merged"
        );
        self.wake();
        outcome
    }

    /// Admit and enqueue a request owned by its requester.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::admit`].
    pub fn schedule(&self, request: &ScheduleRequest) -> BosResult<MergeOutcome> {
        self.admit(request)?;
        Ok(self.enqueue(request, &request.requester))
    }

    /// Run `f` against the queue under the state lock.
    pub fn with_queue<R>(&self, f: impl FnOnce(&EventQueue) -> R) -> R {
        f(&self.shared.state.lock().queue)
    }

    /// Current refresh mode.
    #[must_use]
    pub fn refresh_mode(&self) -> RefreshMode {
        self.shared.state.lock().config.refresh_mode
    }

    /// Current staleness bound.
    #[must_use]
    pub fn max_staleness(&self) -> Duration {
        self.shared.state.lock().config.max_staleness()
    }

    /// Switch refresh mode.
    ///
    /// Entering ACTIVE refreshes immediately and arms a periodic REFRESH.
    /// Entering LAZY lets queued REFRESH events lapse.
    ///
    /// # Errors
    ///
    /// `BosError::Config` if ACTIVE is requested with too small a staleness bound.
    pub fn set_refresh_mode(&self, mode: RefreshMode) -> BosResult<()> {
        let arm = {
            let mut st = self.shared.state.lock();
            let next = ResourceConfig {
                refresh_mode: mode,
                ..st.config
            };
            next.validate().map_err(BosError::Config)?;
            let entering_active = mode == RefreshMode::Active && st.config.refresh_mode != mode;
            st.config = next;
            entering_active && !st.queue.has_refresh()
        };
        info!(name = %self.shared.name, ?mode, "refresh mode changed");
        if arm {
            self.shared.refresh_now();
            let mut st = self.shared.state.lock();
            let at = after(now_ms(), st.config.max_staleness());
            st.queue.push_refresh(at, self.shared.sequences.next());
            drop(st);
            self.wake();
        }
        Ok(())
    }

    /// Change the staleness bound.
    ///
    /// # Errors
    ///
    /// `BosError::Config` if the new bound is invalid for the current mode.
    pub fn set_max_staleness(&self, max_staleness: Duration) -> BosResult<()> {
        let mut st = self.shared.state.lock();
        let next = ResourceConfig {
            max_staleness_ms: u64::try_from(max_staleness.as_millis()).unwrap_or(u64::MAX),
            ..st.config
        };
        next.validate().map_err(BosError::Config)?;
        st.config = next;
        Ok(())
    }

    /// Snapshot of queued events in firing order.
    #[must_use]
    pub fn pending_events(&self) -> Vec<Event> {
        self.with_queue(|q| q.events().cloned().collect())
    }

    /// Snapshot of live reservations.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        self.with_queue(EventQueue::reservations)
    }

    /// Last successfully committed plan.
    #[must_use]
    pub fn committed(&self) -> CommitPlan {
        self.shared.state.lock().committed.clone()
    }

    /// Last successfully committed net current.
    #[must_use]
    pub fn committed_current(&self) -> f64 {
        self.shared.state.lock().committed.total_ma
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.quitting.load(Ordering::Acquire) && self.worker.lock().is_some()
    }

    fn wake(&self) {
        let _ = self.control.send(Control::Wake);
    }

    /// Stop the thread and join it. Idempotent.
    pub fn quit(&self) {
        if !self.quitting.swap(true, Ordering::AcqRel) {
            let _ = self.control.send(Control::Quit);
        }
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!(name = %self.shared.name, "scheduler thread panicked");
        } else {
            info!(name = %self.shared.name, "scheduler stopped");
        }
    }
}

impl<B: Backend> Drop for Scheduler<B> {
    fn drop(&mut self) {
        // signal only; joining is left to an explicit quit()
        if !self.quitting.swap(true, Ordering::AcqRel) {
            let _ = self.control.send(Control::Quit);
            debug!(name = %self.shared.name, "scheduler dropped without quit, thread detached");
        }
    }
}

fn run<B: Backend>(shared: &Shared<B>, control: &Receiver<Control>) {
    loop {
        let deadline = shared.state.lock().queue.next_deadline();
        let signal = match deadline {
            None => control.recv().unwrap_or(Control::Quit),
            Some(at) => {
                let wait = until(at);
                if wait.is_zero() {
                    match control.try_recv() {
                        Ok(Control::Quit) | Err(TryRecvError::Disconnected) => Control::Quit,
                        Ok(Control::Wake) | Err(TryRecvError::Empty) => Control::Wake,
                    }
                } else {
                    match control.recv_timeout(wait) {
                        Ok(signal) => signal,
                        Err(RecvTimeoutError::Timeout) => Control::Wake,
                        Err(RecvTimeoutError::Disconnected) => Control::Quit,
                    }
                }
            }
        };
        if signal == Control::Quit {
            break;
        }
        shared.drain(now_ms());
    }
    trace!(name = %shared.name, "scheduler loop exited");
}
