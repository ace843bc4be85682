//! Exponential-with-jitter delay sampler.

use std::cell::Cell;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Samples successive retry delays that grow quadratically in the attempt
/// count, with exponential jitter so many sessions backing off at once
/// don't all wake up in lockstep.
pub struct BackoffSession {
    basis_wait_time_millis: f64,
    attempts: Cell<u32>,
    rng: std::cell::RefCell<StdRng>,
}

impl BackoffSession {
    /// `basis_wait_time_millis` is the per-attempt scale: with one attempt
    /// and unit jitter the delay is exactly that value.
    pub fn new(basis_wait_time_millis: f64) -> Self {
        Self::with_rng(basis_wait_time_millis, StdRng::from_os_rng())
    }

    pub fn with_rng(basis_wait_time_millis: f64, rng: StdRng) -> Self {
        Self {
            basis_wait_time_millis,
            attempts: Cell::new(0),
            rng: std::cell::RefCell::new(rng),
        }
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    /// Increments the attempt counter and samples the next delay, in
    /// milliseconds.
    ///
    /// `delay = jitter * basis * attempts^2`, where `jitter` is a
    /// standard-exponential(rate=1) sample (mean 1) built from a uniform
    /// draw clamped to at most `0.995` so a vanishingly rare near-1.0 draw
    /// can't produce an unbounded tail.
    pub fn next_sleep_time(&self) -> f64 {
        let attempts = self.attempts.get() + 1;
        self.attempts.set(attempts);

        let u: f64 = self.rng.borrow_mut().random_range(0.0..1.0f64).min(0.995);
        let jitter = -(1.0 - u).ln();

        jitter * self.basis_wait_time_millis * (attempts as f64).powi(2)
    }

    /// Returns the attempt counter to zero.
    pub fn reset_attempts(&self) {
        self.attempts.set(0);
    }
}
