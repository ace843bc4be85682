//! Counting lock: a multi-slot generalisation of [`crate::mutex::Mutex`].

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use slab::Slab;

use crate::cancel::CancelToken;
use crate::condition::Condition;

/// Opaque proof of ownership over one slot, returned by
/// [`Semaphore::acquire`]. Only handles currently in the outstanding set
/// are honored by [`Semaphore::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle(usize);

struct Inner {
    slots: Cell<i64>,
    outstanding: std::cell::RefCell<Slab<()>>,
    condition: Condition,
}

/// An `N`-slot counting lock.
///
/// Invariant: `slots + outstanding.len() == N` always, and every
/// outstanding handle is distinct. Enforced here by minting handles from a
/// [`slab::Slab`], the same identity-table structure
/// [`crate::condition::Condition`] uses for its wait-set.
#[derive(Clone)]
pub struct Semaphore {
    inner: Rc<Inner>,
}

impl Semaphore {
    /// Creates a semaphore with `n` initially free slots.
    pub fn new(n: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                slots: Cell::new(n as i64),
                outstanding: std::cell::RefCell::new(Slab::new()),
                condition: Condition::new(),
            }),
        }
    }

    /// Acquires one slot, suspending while none are free.
    ///
    /// Returns `None` if `cancel` fires before a slot becomes available.
    pub async fn acquire(&self, cancel: Option<&CancelToken>) -> Option<SlotHandle> {
        loop {
            if self.inner.slots.get() >= 1 {
                self.inner.slots.set(self.inner.slots.get() - 1);
                let key = self.inner.outstanding.borrow_mut().insert(());
                tracing::trace!(key, "semaphore slot acquired");
                return Some(SlotHandle(key));
            }
            if !self.inner.condition.wait(cancel).await {
                return None;
            }
        }
    }

    /// Releases a slot if `handle` is still outstanding.
    ///
    /// A no-op for a handle that was never issued or was already released.
    pub fn release(&self, handle: SlotHandle) {
        let removed = {
            let mut outstanding = self.inner.outstanding.borrow_mut();
            if outstanding.contains(handle.0) {
                outstanding.remove(handle.0);
                true
            } else {
                false
            }
        };
        if !removed {
            return;
        }
        self.inner.slots.set(self.inner.slots.get() + 1);
        tracing::trace!(key = handle.0, "semaphore slot released");
        self.inner.condition.notify_one();
    }

    /// Free slots right now. Always `>= 0` in practice since `acquire`
    /// only decrements when a slot is available.
    pub fn available(&self) -> i64 {
        self.inner.slots.get()
    }

    /// Number of tasks currently suspended in [`Semaphore::acquire`].
    pub fn waiting(&self) -> usize {
        self.inner.condition.waiting()
    }

    /// Scoped acquisition: runs `body` while holding a slot, releasing it
    /// on every exit path.
    pub async fn with_slot<T, E, F, Fut>(
        &self,
        body: F,
        cancel: Option<&CancelToken>,
    ) -> Result<T, WithSlotError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(handle) = self.acquire(cancel).await else {
            return Err(WithSlotError::Aborted);
        };
        let result = body().await;
        self.release(handle);
        result.map_err(WithSlotError::Body)
    }
}

/// Outcome of [`Semaphore::with_slot`].
#[derive(Debug, PartialEq, Eq)]
pub enum WithSlotError<E> {
    /// `cancel` fired before a slot was acquired; `body` never ran.
    Aborted,
    /// `body` ran (and the slot was released) but returned an error.
    Body(E),
}
