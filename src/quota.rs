//! Per-second admission pacing.

use std::cell::Cell;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::sleep::sleep;

/// Admits at most `rate_per_second` callers per second, queueing by
/// arrival order.
pub struct QuotaGovernor<'a> {
    clock: &'a dyn Clock,
    wait_period_millis: f64,
    last_time: Cell<Option<f64>>,
    outstanding: Cell<u64>,
}

impl<'a> QuotaGovernor<'a> {
    pub fn new(clock: &'a dyn Clock, rate_per_second: f64) -> Self {
        Self {
            clock,
            wait_period_millis: 1000.0 / rate_per_second,
            last_time: Cell::new(None),
            outstanding: Cell::new(0),
        }
    }

    /// Suspends the caller until it is this arrival's turn to be admitted.
    ///
    /// Returns `true` if admitted, `false` if `cancel` fired first. Either
    /// way, the bookkeeping this call contributed (`outstanding`,
    /// `last_time`) is restored before returning.
    pub async fn wait(&self, cancel: Option<&CancelToken>) -> bool {
        let prior = self.outstanding.get();
        self.outstanding.set(prior + 1);

        let now = self.clock.now_millis();
        let delta_from_last = match self.last_time.get() {
            Some(last) => now - last,
            None => f64::INFINITY,
        };

        let sleep_for = (self.wait_period_millis - delta_from_last).max(0.0)
            + self.wait_period_millis * prior as f64;

        let admitted = if sleep_for <= 0.0 {
            true
        } else {
            sleep(self.clock, sleep_for, cancel).await
        };

        self.last_time.set(Some(self.clock.now_millis()));
        self.outstanding.set(self.outstanding.get() - 1);

        admitted
    }

    /// Callers currently queued (including the caller that just entered
    /// `wait`, before it returns).
    pub fn outstanding(&self) -> u64 {
        self.outstanding.get()
    }
}
