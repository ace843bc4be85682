//! Non-reentrant mutual exclusion lock with handle identity.

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use crate::cancel::CancelToken;
use crate::condition::Condition;

/// Opaque proof of ownership returned by [`Mutex::acquire`].
///
/// Only the most recently issued handle is valid: because [`Mutex`] is
/// non-reentrant, a second `acquire` can only succeed after a `release`,
/// and every `acquire` mints a fresh handle that invalidates the previous
/// one even though `release` itself does not bump the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHandle(u64);

struct Inner {
    locked: Cell<bool>,
    lock_handle: Cell<u64>,
    condition: Condition,
}

/// A single-owner, non-reentrant lock.
///
/// There is no reader/writer distinction and no fairness guarantee beyond
/// what the underlying [`Condition`] provides (uniform-random wake-up among
/// waiters).
#[derive(Clone)]
pub struct Mutex {
    inner: Rc<Inner>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                locked: Cell::new(false),
                lock_handle: Cell::new(0),
                condition: Condition::new(),
            }),
        }
    }

    /// Acquires the lock, suspending while it is held by someone else.
    ///
    /// Returns `None` if `cancel` fires before the lock becomes available.
    pub async fn acquire(&self, cancel: Option<&CancelToken>) -> Option<LockHandle> {
        loop {
            if !self.inner.locked.get() {
                self.inner.locked.set(true);
                let handle = self.inner.lock_handle.get() + 1;
                self.inner.lock_handle.set(handle);
                tracing::trace!(handle, "mutex acquired");
                return Some(LockHandle(handle));
            }
            if !self.inner.condition.wait(cancel).await {
                return None;
            }
        }
    }

    /// Releases the lock if `handle` is the currently valid one.
    ///
    /// A no-op for a stale handle (one issued before the most recent
    /// `acquire`), so a task cancelled after acquiring but before releasing
    /// can never release someone else's critical section.
    pub fn release(&self, handle: LockHandle) {
        if !self.inner.locked.get() || self.inner.lock_handle.get() != handle.0 {
            return;
        }
        self.inner.locked.set(false);
        tracing::trace!(handle = handle.0, "mutex released");
        self.inner.condition.notify_one();
    }

    /// `true` while the lock is held by someone.
    pub fn is_locked(&self) -> bool {
        self.inner.locked.get()
    }

    /// Number of tasks currently suspended in [`Mutex::acquire`].
    pub fn waiting(&self) -> usize {
        self.inner.condition.waiting()
    }

    /// Scoped acquisition: runs `body` while holding the lock, releasing it
    /// on every exit path (including `body` returning an error).
    ///
    /// Resolves to `Err(Aborted)` without ever calling `body` if `cancel`
    /// fires before the lock is acquired.
    pub async fn with_lock<T, E, F, Fut>(
        &self,
        body: F,
        cancel: Option<&CancelToken>,
    ) -> Result<T, WithLockError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(handle) = self.acquire(cancel).await else {
            return Err(WithLockError::Aborted);
        };
        let result = body().await;
        self.release(handle);
        result.map_err(WithLockError::Body)
    }
}

/// Outcome of [`Mutex::with_lock`].
#[derive(Debug, PartialEq, Eq)]
pub enum WithLockError<E> {
    /// `cancel` fired before the lock was acquired; `body` never ran.
    Aborted,
    /// `body` ran (and the lock was released) but returned an error.
    Body(E),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::future::Future;
    use std::pin::Pin;
    use std::rc::Rc;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            raw()
        }
        fn noop(_: *const ()) {}
        fn raw() -> RawWaker {
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        unsafe { Waker::from_raw(raw()) }
    }

    fn poll_once<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(fut).poll(&mut cx)
    }

    #[test]
    fn uncontended_acquire_release_roundtrip() {
        let mutex = Mutex::new();
        let mut fut = Box::pin(mutex.acquire(None));
        let handle = match poll_once(&mut fut) {
            Poll::Ready(Some(h)) => h,
            other => panic!("expected immediate acquire, got {other:?}"),
        };
        assert!(mutex.is_locked());
        mutex.release(handle);
        assert!(!mutex.is_locked());
    }

    #[test]
    fn release_with_stale_handle_is_a_no_op() {
        let mutex = Mutex::new();
        let mut fut = Box::pin(mutex.acquire(None));
        let first = poll_once(&mut fut).map(Option::unwrap);
        let Poll::Ready(first) = first else {
            panic!("expected ready")
        };
        mutex.release(first);

        let mut fut2 = Box::pin(mutex.acquire(None));
        let Poll::Ready(Some(second)) = poll_once(&mut fut2) else {
            panic!("expected ready")
        };

        // Releasing the stale first handle must not unlock the mutex held
        // under `second`.
        mutex.release(first);
        assert!(mutex.is_locked());

        mutex.release(second);
        assert!(!mutex.is_locked());
    }

    #[test]
    fn cancel_before_lock_available_returns_none() {
        let mutex = Mutex::new();
        let mut first = Box::pin(mutex.acquire(None));
        let Poll::Ready(Some(handle)) = poll_once(&mut first) else {
            panic!("expected ready")
        };

        let token = CancelToken::new();
        let mut second = Box::pin(mutex.acquire(Some(&token)));
        assert!(poll_once(&mut second).is_pending());
        token.cancel();
        assert!(matches!(poll_once(&mut second), Poll::Ready(None)));

        // A fresh acquire still succeeds after the first release, proving
        // the cancelled waiter left no trace behind.
        mutex.release(handle);
        let mut third = Box::pin(mutex.acquire(None));
        assert!(matches!(poll_once(&mut third), Poll::Ready(Some(_))));
    }

    #[tokio::test]
    async fn with_lock_runs_body_and_releases() {
        let mutex = Mutex::new();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        let out: Result<i32, ()> = mutex
            .with_lock(
                || async move {
                    ran_clone.set(true);
                    Ok(7)
                },
                None,
            )
            .await
            .map_err(|_| ());
        assert_eq!(out, Ok(7));
        assert!(ran.get());
        assert!(!mutex.is_locked());
    }

    #[tokio::test]
    async fn with_lock_aborted_by_cancel_never_runs_body() {
        let mutex = Mutex::new();
        let _held = mutex.acquire(None).await.unwrap();

        let token = CancelToken::new();
        token.cancel();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        let out: Result<(), ()> = mutex
            .with_lock(
                || async move {
                    ran_clone.set(true);
                    Ok(())
                },
                Some(&token),
            )
            .await
            .map_err(|_| ());
        assert_eq!(out, Err(()));
        assert!(!ran.get());
    }
}
