/*!
 * Host Contract
 * The cycle-driven environment the kernel runs inside
 */

use crate::core::types::{Compute, Cycle, ReserveLevel};
use std::cell::Cell;
use std::rc::Rc;

/// Environment queried by the kernel every cycle.
///
/// The host owns the clock and the compute meter; the kernel never
/// advances either. `compute_used` must reflect everything charged so
/// far this cycle, including work done outside the kernel.
pub trait Host {
    /// Current cycle ordinal, monotonically increasing across calls
    fn cycle(&self) -> Cycle;

    /// Compute charged so far this cycle
    fn compute_used(&self) -> Compute;

    /// Compute limit for this cycle
    fn compute_limit(&self) -> Compute;

    /// Coarse reserve category for this cycle
    fn reserve_level(&self) -> ReserveLevel;
}

/// In-memory host for tests and the demo binary.
///
/// Cloning yields a handle onto the same meter, so driver code and the
/// processes it registers can share one host: the driver advances cycles,
/// processes charge compute through their own handle.
#[derive(Debug, Clone)]
pub struct SimHost {
    inner: Rc<Meter>,
}

#[derive(Debug)]
struct Meter {
    cycle: Cell<Cycle>,
    used: Cell<Compute>,
    limit: Cell<Compute>,
    reserve: Cell<ReserveLevel>,
}

impl SimHost {
    pub fn new(limit: Compute) -> Self {
        Self {
            inner: Rc::new(Meter {
                cycle: Cell::new(0),
                used: Cell::new(0.0),
                limit: Cell::new(limit),
                reserve: Cell::new(ReserveLevel::Normal),
            }),
        }
    }

    /// Move to the next cycle and reset the compute meter
    pub fn advance(&self) {
        self.inner.cycle.set(self.inner.cycle.get() + 1);
        self.inner.used.set(0.0);
    }

    /// Charge compute against the current cycle
    pub fn consume(&self, amount: Compute) {
        self.inner.used.set(self.inner.used.get() + amount);
    }

    pub fn set_limit(&self, limit: Compute) {
        self.inner.limit.set(limit);
    }

    pub fn set_reserve(&self, level: ReserveLevel) {
        self.inner.reserve.set(level);
    }
}

impl Host for SimHost {
    fn cycle(&self) -> Cycle {
        self.inner.cycle.get()
    }

    fn compute_used(&self) -> Compute {
        self.inner.used.get()
    }

    fn compute_limit(&self) -> Compute {
        self.inner.limit.get()
    }

    fn reserve_level(&self) -> ReserveLevel {
        self.inner.reserve.get()
    }
}
