//! Folding a new reservation into the queue.
//!
//! Reservations are merged per owner. A request that reuses a live sequence
//! number replaces that reservation and inherits its magnitude. Otherwise each
//! overlapping reservation of the same owner is trimmed, cancelled or treated
//! as an outer level the new one is nested in:
//!
//! | relation                        | effect                              |
//! |---------------------------------|-------------------------------------|
//! | new covers existing             | CANCEL existing at new start        |
//! | existing strictly covers new    | new magnitude becomes a delta       |
//! | new starts inside existing      | existing END moves to new start     |
//! | new ends inside existing        | existing BEGIN moves to new end     |

use tracing::trace;

use crate::core::event_queue::{EventQueue, Reservation};
use crate::core::request::ScheduleRequest;

/// One adjustment performed while merging.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction {
    /// An existing reservation with the same sequence was replaced.
    Replaced {
        /// Sequence of the replaced reservation.
        sequence: u64,
        /// Magnitude folded into the new one.
        previous_ma: f64,
    },
    /// An existing reservation is cancelled at the new start.
    Cancelled {
        /// Cancelled reservation.
        sequence: u64,
        /// CANCEL timepoint.
        at_ms: u128,
    },
    /// The new reservation sits inside an existing one.
    Nested {
        /// Enclosing reservation.
        sequence: u64,
        /// Magnitude subtracted from the new target.
        enclosing_ma: f64,
    },
    /// An existing reservation now ends where the new one starts.
    TruncatedEnd {
        /// Adjusted reservation.
        sequence: u64,
        /// New END timepoint.
        end_ms: u128,
    },
    /// An existing reservation now begins where the new one ends.
    DeferredBegin {
        /// Adjusted reservation.
        sequence: u64,
        /// New BEGIN timepoint.
        begin_ms: u128,
    },
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Sequence of the inserted reservation.
    pub sequence: u64,
    /// Magnitude the inserted reservation carries.
    pub magnitude_ma: f64,
    /// Adjustments made to existing reservations.
    pub actions: Vec<MergeAction>,
}

impl EventQueue {
    /// Merge `request` into the queue on behalf of `owner`.
    pub fn merge(&mut self, request: &ScheduleRequest, owner: &str) -> MergeOutcome {
        let (start, end) = (request.start_ms, request.end_ms);
        let mut target = request.target_ma;
        let mut actions = Vec::new();

        if let Some(previous) = self.remove(request.sequence) {
            target += previous.magnitude_ma;
            actions.push(MergeAction::Replaced {
                sequence: previous.sequence,
                previous_ma: previous.magnitude_ma,
            });
        } else {
            let mut overlapping: Vec<Reservation> = self
                .reservations_of(owner)
                .filter(|r| r.cancel_at_ms.is_none() && request.overlaps(r.begin_ms, r.end_ms))
                .cloned()
                .collect();
            overlapping.sort_by_key(|r| (r.begin_ms, r.sequence));

            for existing in overlapping {
                let (s, e) = (existing.begin_ms, existing.end_ms);
                let action = if start <= s && end >= e {
                    self.push_cancel(start, existing.sequence);
                    MergeAction::Cancelled {
                        sequence: existing.sequence,
                        at_ms: start,
                    }
                } else if start >= s && end < e {
                    target -= existing.magnitude_ma;
                    MergeAction::Nested {
                        sequence: existing.sequence,
                        enclosing_ma: existing.magnitude_ma,
                    }
                } else if start >= s {
                    self.set_end(existing.sequence, start);
                    MergeAction::TruncatedEnd {
                        sequence: existing.sequence,
                        end_ms: start,
                    }
                } else {
                    self.set_begin(existing.sequence, end);
                    MergeAction::DeferredBegin {
                        sequence: existing.sequence,
                        begin_ms: end,
                    }
                };
                trace!(?action, owner, "merge adjusted reservation");
                actions.push(action);
            }
        }

        self.insert(Reservation {
            sequence: request.sequence,
            owner: owner.to_string(),
            begin_ms: start,
            end_ms: end,
            magnitude_ma: target,
            is_floor: request.is_floor,
            active: false,
            cancel_at_ms: None,
        });

        MergeOutcome {
            sequence: request.sequence,
            magnitude_ma: target,
            actions,
        }
    }
}
