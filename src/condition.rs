//! The leaf wait/notify primitive every other primitive in this crate is
//! built on top of.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use rand::RngCore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slab::Slab;

use crate::cancel::{CancelToken, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Pending,
    Notified,
    Cancelled,
}

struct WaiterState {
    resolution: Resolution,
    waker: Option<Waker>,
}

struct Inner {
    waiters: Slab<Rc<RefCell<WaiterState>>>,
    rng: Box<dyn RngCore>,
}

/// A wait-set with `notify_one` / `notify_all` and cooperative cancellation.
///
/// Every other primitive in this crate (`Mutex`, `Semaphore`, `Channel`,
/// `RecurrentJob`) composes one or more `Condition`s rather than
/// implementing its own wait-set.
pub struct Condition {
    inner: Rc<RefCell<Inner>>,
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    /// Creates a `Condition` backed by the thread-local RNG.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Creates a `Condition` backed by a caller-supplied RNG.
    ///
    /// Exists so fairness tests can inject a seeded, reproducible RNG
    /// instead of depending on the process's default one.
    pub fn with_rng<R: RngCore + 'static>(rng: R) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                waiters: Slab::new(),
                rng: Box::new(rng),
            })),
        }
    }

    /// Number of tasks currently suspended in [`Condition::wait`].
    pub fn waiting(&self) -> usize {
        self.inner.borrow().waiters.len()
    }

    /// Suspends the caller until notified or cancelled.
    ///
    /// Resolves to `true` if woken by [`Condition::notify_one`] or
    /// [`Condition::notify_all`], `false` if the `cancel` token fired
    /// first. If `cancel` is already cancelled on entry, the wait still
    /// registers and is resolved cancelled on its very first poll, which
    /// keeps cleanup uniform across every exit path instead of special
    /// casing the already-cancelled case.
    pub fn wait(&self, cancel: Option<&CancelToken>) -> Wait {
        Wait {
            condition: self.inner.clone(),
            cancel: cancel.cloned(),
            registration: None,
        }
    }

    /// Wakes one waiter, chosen uniformly at random among those currently
    /// waiting. A no-op (the notification is lost) if nobody is waiting.
    pub fn notify_one(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.waiters.is_empty() {
            return;
        }
        let len = inner.waiters.len();
        let idx = inner.rng.random_range(0..len);
        let key = inner
            .waiters
            .iter()
            .nth(idx)
            .map(|(key, _)| key)
            .expect("idx in range");
        let state = inner.waiters.remove(key);
        drop(inner);
        let waker = {
            let mut state = state.borrow_mut();
            // A waiter can only still be in the slab while `Pending`: a
            // cancellation removes its own entry before resolving it (see
            // `Wait::poll`'s cancel subscription). This check stays as a
            // guard against resurrecting an already-resolved waiter even
            // if that invariant is ever violated elsewhere.
            if state.resolution != Resolution::Pending {
                return;
            }
            state.resolution = Resolution::Notified;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Wakes every waiter. The wait-set is emptied before any waiter's
    /// waker runs, so a continuation woken here can never observe a stale
    /// wait-set (e.g. by re-entering `wait` and seeing itself still
    /// registered).
    pub fn notify_all(&self) {
        let drained: Vec<_> = {
            let mut inner = self.inner.borrow_mut();
            inner.waiters.drain().collect()
        };
        tracing::trace!(count = drained.len(), "condition notify_all");
        for state in drained {
            let waker = {
                let mut state = state.borrow_mut();
                // See the matching guard in `notify_one`.
                if state.resolution != Resolution::Pending {
                    continue;
                }
                state.resolution = Resolution::Notified;
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        }
    }
}

struct Registration {
    key: usize,
    state: Rc<RefCell<WaiterState>>,
    sub_id: Option<SubscriptionId>,
}

/// Future returned by [`Condition::wait`].
#[must_use = "futures do nothing unless polled"]
pub struct Wait {
    condition: Rc<RefCell<Inner>>,
    cancel: Option<CancelToken>,
    registration: Option<Registration>,
}

impl Future for Wait {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.registration.is_none() {
            let state = Rc::new(RefCell::new(WaiterState {
                resolution: Resolution::Pending,
                waker: Some(cx.waker().clone()),
            }));
            let key = this.condition.borrow_mut().waiters.insert(state.clone());

            let sub_id = this.cancel.as_ref().map(|token| {
                let state_for_cancel = state.clone();
                let condition_for_cancel = this.condition.clone();
                let waker_for_wake = cx.waker().clone();
                token.subscribe(move || {
                    let waker = {
                        let mut s = state_for_cancel.borrow_mut();
                        if s.resolution == Resolution::Pending {
                            s.resolution = Resolution::Cancelled;
                            // Remove before resolving, mirroring the
                            // remove-then-resolve order `notify_one`/
                            // `notify_all` use, so a `notify_*` racing
                            // this synchronous cancellation can never see
                            // (and resurrect) an already-cancelled entry.
                            let mut inner = condition_for_cancel.borrow_mut();
                            if inner.waiters.contains(key) {
                                inner.waiters.remove(key);
                            }
                            drop(inner);
                            s.waker.take()
                        } else {
                            None
                        }
                    };
                    // Prefer the freshest waker registered by poll, falling
                    // back to the one captured when we subscribed.
                    waker.unwrap_or(waker_for_wake).wake();
                })
            });

            this.registration = Some(Registration {
                key,
                state,
                sub_id,
            });
        }

        let registration = this.registration.as_ref().expect("just registered");
        let mut state = registration.state.borrow_mut();
        match state.resolution {
            Resolution::Pending => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Resolution::Notified => Poll::Ready(true),
            Resolution::Cancelled => Poll::Ready(false),
        }
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        // Cleanup must run on every exit path: dequeue from the wait-set
        // (if `notify_one`/`notify_all` hasn't already done so) and
        // unsubscribe from the cancel token (if it hasn't already fired).
        if let Some(registration) = self.registration.take() {
            let mut inner = self.condition.borrow_mut();
            if inner.waiters.contains(registration.key) {
                inner.waiters.remove(registration.key);
            }
            drop(inner);
            if let (Some(token), Some(sub_id)) = (&self.cancel, registration.sub_id) {
                token.unsubscribe(sub_id);
            }
        }
    }
}
