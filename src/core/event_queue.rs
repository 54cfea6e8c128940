//! Ordered event queue with reservation bookkeeping.
//!
//! Every reservation owns a BEGIN and an END event keyed by its sequence
//! number. The queue keeps the events in canonical order (see
//! [`Event`]) and the reservation records in a side index so that a
//! reservation can be moved, replaced or cancelled without leaving orphan
//! events behind.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::event::{Event, EventKind};

/// A BEGIN/END pair as tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation key.
    pub sequence: u64,
    /// Requester that owns it.
    pub owner: String,
    /// BEGIN timepoint, ms since epoch.
    pub begin_ms: u128,
    /// END timepoint, ms since epoch.
    pub end_ms: u128,
    /// Contribution to the net current while active, in mA.
    pub magnitude_ma: f64,
    /// Floor/ceiling flag carried to the driver.
    pub is_floor: bool,
    /// BEGIN has fired and END has not.
    pub active: bool,
    /// A CANCEL for this reservation is queued at this timepoint.
    pub cancel_at_ms: Option<u128>,
}

impl Reservation {
    /// Contributes at instant `t`.
    #[must_use]
    pub fn covers(&self, t: u128) -> bool {
        self.begin_ms <= t
            && t < self.end_ms
            && self.cancel_at_ms.map_or(true, |c| t < c)
    }

    fn edge(&self, kind: EventKind, timepoint_ms: u128) -> Event {
        Event {
            timepoint_ms,
            sequence: self.sequence,
            kind,
            magnitude_ma: self.magnitude_ma,
            is_floor: self.is_floor,
            owner: self.owner.clone(),
        }
    }

    fn begin_event(&self) -> Event {
        self.edge(EventKind::SetCurrentBegin, self.begin_ms)
    }

    fn end_event(&self) -> Event {
        self.edge(EventKind::SetCurrentEnd, self.end_ms)
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drain {
    /// A REFRESH event fired.
    pub refresh: bool,
    /// Reservations whose BEGIN fired.
    pub began: Vec<u64>,
    /// Reservations whose END fired.
    pub ended: Vec<u64>,
    /// Reservations dropped by a CANCEL.
    pub cancelled: Vec<u64>,
}

impl Drain {
    /// Nothing fired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.refresh && self.began.is_empty() && self.ended.is_empty() && self.cancelled.is_empty()
    }

    /// Whether any reservation edge changed the active set.
    #[must_use]
    pub fn touched_reservations(&self) -> bool {
        !(self.began.is_empty() && self.ended.is_empty() && self.cancelled.is_empty())
    }
}

/// Per-resource event queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: BTreeSet<Event>,
    reservations: HashMap<u64, Reservation>,
}

impl EventQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// No queued events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timepoint of the earliest queued event.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u128> {
        self.events.first().map(|e| e.timepoint_ms)
    }

    /// Queued events in firing order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Whether a REFRESH is queued.
    #[must_use]
    pub fn has_refresh(&self) -> bool {
        self.events.iter().any(|e| e.kind == EventKind::Refresh)
    }

    /// Snapshot of all live reservations ordered by begin time.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self.reservations.values().cloned().collect();
        out.sort_by_key(|r| (r.begin_ms, r.sequence));
        out
    }

    /// Look up a reservation.
    #[must_use]
    pub fn reservation(&self, sequence: u64) -> Option<&Reservation> {
        self.reservations.get(&sequence)
    }

    pub(crate) fn reservations_of<'a>(
        &'a self,
        owner: &'a str,
    ) -> impl Iterator<Item = &'a Reservation> + 'a {
        self.reservations.values().filter(move |r| r.owner == owner)
    }

    /// Queue a REFRESH at `timepoint_ms`.
    pub fn push_refresh(&mut self, timepoint_ms: u128, sequence: u64) {
        self.events.insert(Event::refresh(timepoint_ms, sequence));
    }

    /// Queue a CANCEL of `sequence` at `timepoint_ms`.
    pub fn push_cancel(&mut self, timepoint_ms: u128, sequence: u64) {
        if let Some(r) = self.reservations.get_mut(&sequence) {
            r.cancel_at_ms = Some(r.cancel_at_ms.map_or(timepoint_ms, |c| c.min(timepoint_ms)));
            let owner = r.owner.clone();
            self.events
                .insert(Event::cancel(timepoint_ms, sequence, &owner));
        }
    }

    /// Insert a reservation and its BEGIN/END events.
    pub fn insert(&mut self, reservation: Reservation) {
        if !reservation.active {
            self.events.insert(reservation.begin_event());
        }
        self.events.insert(reservation.end_event());
        self.reservations.insert(reservation.sequence, reservation);
    }

    /// Remove a reservation together with every event that refers to it.
    pub fn remove(&mut self, sequence: u64) -> Option<Reservation> {
        let reservation = self.reservations.remove(&sequence)?;
        self.events.remove(&reservation.begin_event());
        self.events.remove(&reservation.end_event());
        if let Some(at) = reservation.cancel_at_ms {
            self.events.remove(&Event::cancel(at, sequence, &reservation.owner));
        }
        Some(reservation)
    }

    /// Move a reservation's END.
    pub fn set_end(&mut self, sequence: u64, end_ms: u128) {
        if let Some(r) = self.reservations.get_mut(&sequence) {
            self.events.remove(&r.end_event());
            r.end_ms = end_ms;
            self.events.insert(r.end_event());
        }
    }

    /// Move a reservation's BEGIN. Has no event effect once it is active.
    pub fn set_begin(&mut self, sequence: u64, begin_ms: u128) {
        if let Some(r) = self.reservations.get_mut(&sequence) {
            if r.active {
                r.begin_ms = begin_ms;
                return;
            }
            self.events.remove(&r.begin_event());
            r.begin_ms = begin_ms;
            self.events.insert(r.begin_event());
        }
    }

    /// Pop and apply every event due at or before `now_ms`, in canonical order.
    pub fn drain_due(&mut self, now_ms: u128) -> Drain {
        let mut drain = Drain::default();
        while self
            .events
            .first()
            .is_some_and(|e| e.timepoint_ms <= now_ms)
        {
            let Some(event) = self.events.pop_first() else {
                break;
            };
            match event.kind {
                EventKind::Refresh => drain.refresh = true,
                EventKind::Cancel => {
                    if self.remove(event.sequence).is_some() {
                        drain.cancelled.push(event.sequence);
                    }
                }
                EventKind::SetCurrentBegin => {
                    if let Some(r) = self.reservations.get_mut(&event.sequence) {
                        r.active = true;
                        drain.began.push(event.sequence);
                    }
                }
                EventKind::SetCurrentEnd => {
                    if let Some(r) = self.reservations.remove(&event.sequence) {
                        if let Some(at) = r.cancel_at_ms {
                            self.events.remove(&Event::cancel(at, r.sequence, &r.owner));
                        }
                        drain.ended.push(event.sequence);
                    }
                }
            }
        }
        drain
    }

    /// Sum of the magnitudes of all active reservations.
    #[must_use]
    pub fn net_current(&self) -> f64 {
        self.reservations
            .values()
            .filter(|r| r.active)
            .map(|r| r.magnitude_ma)
            .sum()
    }

    /// Net active magnitude per owner.
    #[must_use]
    pub fn net_by_owner(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for r in self.reservations.values().filter(|r| r.active) {
            *out.entry(r.owner.clone()).or_insert(0.0) += r.magnitude_ma;
        }
        out
    }

    /// Floor flag of the most recently created active reservation.
    #[must_use]
    pub fn active_floor(&self) -> bool {
        self.reservations
            .values()
            .filter(|r| r.active)
            .max_by_key(|r| r.sequence)
            .is_some_and(|r| r.is_floor)
    }

    /// Planned magnitude at instant `t` over reservations accepted by `filter`.
    pub fn level_at(&self, t: u128, filter: impl Fn(&Reservation) -> bool) -> f64 {
        self.reservations
            .values()
            .filter(|r| filter(r) && r.covers(t))
            .map(|r| r.magnitude_ma)
            .sum()
    }

    /// Distinct BEGIN/END timepoints strictly inside `(start_ms, end_ms)` of
    /// reservations accepted by `filter`, ascending.
    pub fn edges_within(
        &self,
        start_ms: u128,
        end_ms: u128,
        filter: impl Fn(&Reservation) -> bool,
    ) -> Vec<u128> {
        let edges: BTreeSet<u128> = self
            .reservations
            .values()
            .filter(|r| filter(r))
            .flat_map(|r| {
                let end = r.cancel_at_ms.map_or(r.end_ms, |c| c.min(r.end_ms));
                [r.begin_ms, end]
            })
            .filter(|t| start_ms < *t && *t < end_ms)
            .collect();
        edges.into_iter().collect()
    }
}
