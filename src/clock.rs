//! Monotonic clock and timer abstraction.
//!
//! The crate's only host contract besides [`crate::cancel::CancelToken`]:
//! a strictly non-decreasing millisecond clock, and a way to schedule a
//! one-shot callback after a delay. [`sleep`](crate::sleep::sleep) is built
//! directly on [`Clock::schedule`]; [`crate::quota::QuotaGovernor`] and
//! [`crate::backoff::BackoffSession`] only need [`Clock::now_millis`].
//!
//! Building an actual platform timer facility is out of scope for this
//! crate; [`SystemClock`] below is the minimal host-provided implementation
//! doctests and tests run against, not a production timer wheel. Callers
//! embedding this crate in a real single-threaded executor are expected to
//! supply their own [`Clock`] that integrates with that executor's reactor
//! instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cancel handle for a scheduled timer callback.
///
/// Dropping it without calling [`TimerHandle::cancel`] leaves the timer
/// armed; callers that need to bail out early (e.g. a cancelled `sleep`)
/// must call `cancel` explicitly so the underlying timer facility can
/// release its resources.
pub trait TimerHandle {
    /// Cancels the timer. A no-op if it already fired.
    fn cancel(&self);
}

/// Abstract monotonic clock and timer facility.
///
/// Implementations must guarantee `now_millis` is non-decreasing and that
/// `schedule`'s callback fires at most once. `schedule` must return
/// immediately; the callback runs later, out-of-band.
pub trait Clock {
    /// Current time in fractional milliseconds. Only meaningful relative to
    /// other calls on the same `Clock`.
    fn now_millis(&self) -> f64;

    /// Schedules `cb` to run once, `delay_millis` from now, unless
    /// cancelled first. Returns a handle that can cancel the timer before
    /// it fires.
    fn schedule(&self, delay_millis: f64, cb: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle>;
}

struct OsThreadTimer {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for OsThreadTimer {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// The real-time [`Clock`], backed by [`std::time::Instant`] for
/// timestamps and a detached OS thread per timer for scheduling.
///
/// This is a host-boundary concession, not part of the cooperative core.
/// The spawned thread only flips an atomic and invokes `cb` (typically a
/// `Waker::wake`, which is `Send + Sync` by contract); it never touches the
/// `Rc`-based state the rest of this crate uses.
#[derive(Default)]
pub struct SystemClock {
    epoch: std::sync::OnceLock<std::time::Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch(&self) -> std::time::Instant {
        *self.epoch.get_or_init(std::time::Instant::now)
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> f64 {
        self.epoch().elapsed().as_secs_f64() * 1000.0
    }

    fn schedule(&self, delay_millis: f64, cb: Box<dyn FnOnce() + Send>) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_for_timer = cancelled.clone();
        let delay = std::time::Duration::from_secs_f64(delay_millis.max(0.0) / 1000.0);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if !cancelled_for_timer.load(Ordering::SeqCst) {
                cb();
            }
        });
        Box::new(OsThreadTimer { cancelled })
    }
}
