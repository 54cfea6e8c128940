//! Scheduler events and their canonical total order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// What an event does when it fires.
///
/// Declaration order is the tie-break priority at equal timepoints: a
/// resource reacts to reservation edges before housekeeping refreshes, and a
/// cancellation pre-empts any edge due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Drop the reservation identified by the event's sequence number.
    Cancel,
    /// A reservation starts contributing its magnitude.
    SetCurrentBegin,
    /// A reservation stops contributing its magnitude.
    SetCurrentEnd,
    /// Re-read the resource status.
    Refresh,
}

/// A queued scheduler event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// When the event fires, ms since epoch.
    pub timepoint_ms: u128,
    /// Unique key; pairs a BEGIN with its END.
    pub sequence: u64,
    /// Event kind.
    pub kind: EventKind,
    /// Reservation magnitude in mA (zero for refresh/cancel).
    pub magnitude_ma: f64,
    /// Whether the magnitude is a floor (`>=`) rather than a ceiling.
    pub is_floor: bool,
    /// Requester that owns the reservation.
    pub owner: String,
}

impl Event {
    /// A refresh event.
    #[must_use]
    pub fn refresh(timepoint_ms: u128, sequence: u64) -> Self {
        Self {
            timepoint_ms,
            sequence,
            kind: EventKind::Refresh,
            magnitude_ma: 0.0,
            is_floor: false,
            owner: String::new(),
        }
    }

    /// A cancellation of reservation `sequence`.
    #[must_use]
    pub fn cancel(timepoint_ms: u128, sequence: u64, owner: &str) -> Self {
        Self {
            timepoint_ms,
            sequence,
            kind: EventKind::Cancel,
            magnitude_ma: 0.0,
            is_floor: false,
            owner: owner.to_string(),
        }
    }

    fn key(&self) -> (u128, EventKind, u64) {
        (self.timepoint_ms, self.kind, self.sequence)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // time first, then kind priority, then sequence
        self.key().cmp(&other.key())
    }
}
