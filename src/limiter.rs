//! Bounded fan-out task pool with drain.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::cancel::CancelToken;
use crate::condition::Condition;
use crate::semaphore::Semaphore;
use crate::spawn::Spawner;

struct Inner {
    semaphore: Semaphore,
    outstanding: Cell<u64>,
    drain: Condition,
}

/// Caps the number of operation bodies executing at once at `limit`,
/// running each as a detached task on a caller-supplied [`Spawner`].
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Rc<Inner>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                semaphore: Semaphore::new(limit),
                outstanding: Cell::new(0),
                drain: Condition::new(),
            }),
        }
    }

    /// Acquires a slot (suspending while the limiter is saturated), then
    /// spawns `op` as a detached task via `spawner`.
    ///
    /// Returns as soon as the slot is acquired; it does not await `op`
    /// itself. If `cancel` fires before a slot is free, no task is spawned
    /// and the pre-increment to `outstanding` is undone.
    ///
    /// `op`'s failures are routed to `on_error` if supplied; otherwise they
    /// propagate out of the detached task. Either way, slot release and the
    /// `outstanding` decrement (including the drain notification, if it
    /// reached zero) run first.
    pub async fn run<Op, Fut, E>(
        &self,
        spawner: &dyn Spawner,
        op: Op,
        on_error: Option<Box<dyn FnOnce(E)>>,
        cancel: Option<&CancelToken>,
    ) -> bool
    where
        Op: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: 'static,
    {
        self.inner.outstanding.set(self.inner.outstanding.get() + 1);

        let slot = match self.inner.semaphore.acquire(cancel).await {
            Some(slot) => slot,
            None => {
                self.finish();
                return false;
            }
        };

        let inner = self.inner.clone();
        spawner.spawn(Box::pin(async move {
            let result = op().await;
            inner.semaphore.release(slot);
            let remaining = inner.outstanding.get() - 1;
            inner.outstanding.set(remaining);
            if remaining == 0 {
                inner.drain.notify_all();
            }
            if let Err(err) = result {
                if let Some(on_error) = on_error {
                    on_error(err);
                } else {
                    // No handler: this mirrors an unhandled-task error
                    // surfacing out of the detached task to the host
                    // runtime's own panic/error reporting.
                    panic!("ConcurrencyLimiter operation failed with no on_error handler");
                }
            }
        }) as Pin<Box<dyn Future<Output = ()>>>);

        true
    }

    fn finish(&self) {
        let remaining = self.inner.outstanding.get() - 1;
        self.inner.outstanding.set(remaining);
        if remaining == 0 {
            self.inner.drain.notify_all();
        }
    }

    /// Operations submitted but not yet finished.
    pub fn outstanding(&self) -> u64 {
        self.inner.outstanding.get()
    }

    /// Suspends until every submitted operation has finished.
    pub async fn wait(&self) {
        while self.inner.outstanding.get() > 0 {
            self.inner.drain.wait(None).await;
        }
    }
}
