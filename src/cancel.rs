//! Cancellation tokens.
//!
//! An abstract, one-shot signal threaded through every blocking call in this
//! crate. Firing is idempotent: the first call to [`CancelToken::cancel`]
//! runs every subscriber exactly once; later calls are no-ops.

use std::cell::RefCell;
use std::rc::Rc;

use slab::Slab;

/// A boxed, once-only callback run when a [`CancelToken`] fires.
type Subscriber = Box<dyn FnOnce()>;

/// Opaque key returned by [`CancelToken::subscribe`], required to
/// [`CancelToken::unsubscribe`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

struct State {
    cancelled: bool,
    subscribers: Slab<Subscriber>,
}

/// A cooperative cancellation token.
///
/// Cloning shares the underlying state: cancelling any clone cancels every
/// other clone. Tokens are `!Send + !Sync`: the scheduling model this
/// crate targets is single-threaded cooperative, not multi-threaded.
#[derive(Clone)]
pub struct CancelToken {
    state: Rc<RefCell<State>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                cancelled: false,
                subscribers: Slab::new(),
            })),
        }
    }

    /// Returns `true` if this token (or a clone of it) has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().cancelled
    }

    /// Marks the token as cancelled and runs every subscriber exactly once.
    ///
    /// Idempotent: firing an already-cancelled token is a no-op.
    pub fn cancel(&self) {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::replace(&mut state.subscribers, Slab::new())
        };
        tracing::trace!(count = subscribers.len(), "cancel token fired");
        for (_, cb) in subscribers {
            cb();
        }
    }

    /// Registers `cb` to run exactly once when the token fires.
    ///
    /// If the token is already cancelled, `cb` runs immediately and a
    /// (already-invalid) subscription id is still returned so callers can
    /// uniformly call [`CancelToken::unsubscribe`] on every exit path.
    pub fn subscribe<F: FnOnce() + 'static>(&self, cb: F) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        if state.cancelled {
            drop(state);
            cb();
            return SubscriptionId(usize::MAX);
        }
        let key = state.subscribers.insert(Box::new(cb));
        SubscriptionId(key)
    }

    /// Removes a subscription registered via [`CancelToken::subscribe`].
    ///
    /// No-op if the id is stale (already fired, already unsubscribed, or the
    /// sentinel returned for an already-cancelled token).
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if id.0 == usize::MAX {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.subscribers.contains(id.0) {
            state.subscribers.remove(id.0);
        }
    }

    /// Derives a child token that fires when either `self` or the child
    /// itself is cancelled directly. Used by `select` to hasten sibling
    /// reads once one of them has claimed the handoff.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        if self.is_cancelled() {
            child.cancel();
            return child;
        }
        let weak_child = child.clone();
        let id = self.subscribe(move || weak_child.cancel());
        // If the child resolves first there's nothing to clean up on this
        // parent subscription beyond letting it become a lost no-op call;
        // keep the id only so the intent is documented here.
        let _ = id;
        child
    }
}
