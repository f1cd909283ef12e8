//! Time and cancellation seams used by the blocking controller driver.

use core::{
    cell::Cell,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::telemetry::TelemetryInstant;

/// Clock plus blocking sleep.
///
/// Host tooling implements this over a simulated clock; tests use a fake that
/// simply advances a counter.
pub trait Scheduler {
    type Instant: TelemetryInstant;

    /// Current monotonic instant.
    fn now(&self) -> Self::Instant;

    /// Blocks for `duration`.
    fn sleep(&mut self, duration: Duration);
}

impl<T: Scheduler + ?Sized> Scheduler for &mut T {
    type Instant = T::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// External request to stop the control loop, polled between cycles.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

impl CancelSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<T: CancelSignal + ?Sized> CancelSignal for &T {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Signal that never fires.
#[derive(Copy, Clone, Debug, Default)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Allows a fixed number of cycles, then cancels.
///
/// Every poll that does not cancel consumes one cycle from the budget.
#[derive(Debug)]
pub struct CycleBudget {
    remaining: Cell<u32>,
}

impl CycleBudget {
    #[must_use]
    pub const fn new(cycles: u32) -> Self {
        Self {
            remaining: Cell::new(cycles),
        }
    }

    /// Cycles still allowed.
    pub fn remaining(&self) -> u32 {
        self.remaining.get()
    }
}

impl CancelSignal for CycleBudget {
    fn is_cancelled(&self) -> bool {
        match self.remaining.get() {
            0 => true,
            left => {
                self.remaining.set(left - 1);
                false
            }
        }
    }
}
