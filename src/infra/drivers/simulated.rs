//! In-process battery model integrated by coulomb counting.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::{BosResult, DeviceDriver, Status};
use crate::util::clock::{hours_between, now_ms};

#[derive(Debug)]
struct SimState {
    status: Status,
    last_update_ms: u128,
}

impl SimState {
    // integrate the present current up to `now`; empty or full stops the flow
    fn advance(&mut self, now: u128) {
        let s = &mut self.status;
        s.capacity_mah -= s.current_ma * hours_between(self.last_update_ms, now);
        if s.capacity_mah <= 0.0 {
            s.capacity_mah = 0.0;
            if s.current_ma > 0.0 {
                s.current_ma = 0.0;
            }
        }
        if s.capacity_mah >= s.max_capacity_mah {
            s.capacity_mah = s.max_capacity_mah;
            if s.current_ma < 0.0 {
                s.current_ma = 0.0;
            }
        }
        self.last_update_ms = self.last_update_ms.max(now);
        s.timestamp_ms = now;
    }
}

/// A battery simulated in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedBattery {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBattery {
    /// Start from `initial`; its current is ignored and starts at zero.
    #[must_use]
    pub fn new(initial: Status) -> Self {
        let now = now_ms();
        let status = Status {
            current_ma: 0.0,
            capacity_mah: initial.capacity_mah.clamp(0.0, initial.max_capacity_mah.max(0.0)),
            timestamp_ms: now,
            ..initial
        };
        Self {
            state: Arc::new(Mutex::new(SimState {
                status,
                last_update_ms: now,
            })),
        }
    }

    /// State as of now, without going through a resource.
    #[must_use]
    pub fn peek(&self) -> Status {
        let mut st = self.state.lock();
        st.advance(now_ms());
        st.status
    }
}

impl DeviceDriver for SimulatedBattery {
    fn refresh(&self) -> BosResult<Status> {
        Ok(self.peek())
    }

    fn commit_current(&self, target_ma: f64, _is_floor: bool) -> BosResult<()> {
        let mut st = self.state.lock();
        st.advance(now_ms());
        let s = &mut st.status;
        let clamped = target_ma
            .max(-s.max_charge_current_ma)
            .min(s.max_discharge_current_ma);
        if (clamped - target_ma).abs() > f64::EPSILON {
            debug!(target_ma, clamped, "simulated battery clamped command");
        }
        s.current_ma = clamped;
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "simulated"
    }
}
