//! Unbuffered rendezvous channel.
//!
//! A single `write` handshakes with a single `read`; there is no internal
//! queue.

mod error;
mod iter;
mod select;

pub use error::ChannelError;
pub use iter::Iter;
pub use select::{SelectArm, select};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::cancel::CancelToken;
use crate::condition::Condition;

struct Inner<T> {
    read_serial: Cell<i64>,
    write_serial: Cell<i64>,
    closed: Cell<bool>,
    value_in_transit: Cell<bool>,
    slot: RefCell<Option<T>>,
    read_waiters: Condition,
    write_completion_waiters: Condition,
    write_admission_waiters: Condition,
}

/// An unbuffered rendezvous channel.
///
/// Cloning shares the channel; the channel itself stays alive as long as
/// any clone does, there is no separate sender/receiver split (unlike the
/// bounded SPSC channel this crate's ambient stack descends from) because
/// either side of the rendezvous can read or write.
pub struct Channel<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        // The two serial counters just need to start equal; a sentinel
        // value only matters for implementations that reuse the same
        // integer type for other purposes. Plain `0` is equivalent here
        // and friendlier in traces/tests.
        Self {
            inner: Rc::new(Inner {
                read_serial: Cell::new(0),
                write_serial: Cell::new(0),
                closed: Cell::new(false),
                value_in_transit: Cell::new(false),
                slot: RefCell::new(None),
                read_waiters: Condition::new(),
                write_completion_waiters: Condition::new(),
                write_admission_waiters: Condition::new(),
            }),
        }
    }

    /// `true` once [`Channel::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Idempotently closes the channel.
    ///
    /// Every pending `read`/`write` observes [`ChannelError::Closed`] once
    /// its current wait loop notices `closed`; every subsequent call raises
    /// it immediately.
    pub fn close(&self) {
        if self.inner.closed.replace(true) {
            return;
        }
        tracing::debug!("channel closed");
        self.inner.read_waiters.notify_all();
        self.inner.write_completion_waiters.notify_all();
        self.inner.write_admission_waiters.notify_all();
    }

    /// Hands `value` off to a matching `read`.
    ///
    /// Suspends until either a reader consumes the value or `cancel` fires.
    pub async fn write(&self, value: T, cancel: Option<&CancelToken>) -> Result<(), ChannelError> {
        // Step 1: wait for any prior handoff to finish being claimed.
        while self.inner.value_in_transit.get() && !self.inner.closed.get() {
            if !self
                .inner
                .write_admission_waiters
                .wait(cancel)
                .await
            {
                return Err(ChannelError::WriteCancelled);
            }
        }

        // Step 2.
        if self.inner.closed.get() {
            return Err(ChannelError::Closed);
        }

        // Step 3: publish the value and notify one reader.
        self.inner.value_in_transit.set(true);
        *self.inner.slot.borrow_mut() = Some(value);
        let target = self.inner.write_serial.get() + 1;
        self.inner.write_serial.set(target);
        self.inner.read_waiters.notify_one();

        // Step 4: wait for a reader to complete the handoff.
        let mut wait_cancelled = false;
        while self.inner.read_serial.get() < target && !self.inner.closed.get() {
            if !self
                .inner
                .write_completion_waiters
                .wait(cancel)
                .await
            {
                wait_cancelled = true;
                break;
            }
        }

        // Step 5: a reader that never showed up must not leave the serial
        // counters misaligned for the next handoff.
        if wait_cancelled {
            self.inner.read_serial.set(self.inner.read_serial.get() + 1);
        }

        // Step 6: unconditional epilogue.
        *self.inner.slot.borrow_mut() = None;
        self.inner.value_in_transit.set(false);
        self.inner.write_admission_waiters.notify_one();

        if wait_cancelled {
            return Err(ChannelError::WriteCancelled);
        }
        if self.inner.closed.get() {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    /// Consumes a value handed off by a matching `write`.
    ///
    /// Suspends until either a writer posts a value or `cancel` fires.
    pub async fn read(&self, cancel: Option<&CancelToken>) -> Result<T, ChannelError> {
        self.read_with_policy(cancel, &mut || false).await
    }

    /// Same protocol as [`Channel::read`], but `decline` is consulted after
    /// a value becomes available and before it is consumed: if it returns
    /// `true`, this call raises [`ChannelError::ReadCancelled`] instead of
    /// claiming the value, leaving it for the writer's serial counters as
    /// if this read had been cancelled outright.
    ///
    /// This is the hook [`select`] uses to make exactly one sibling read
    /// claim a given handoff.
    pub(crate) async fn read_with_policy(
        &self,
        cancel: Option<&CancelToken>,
        decline: &mut dyn FnMut() -> bool,
    ) -> Result<T, ChannelError> {
        // Step 1.
        while self.inner.read_serial.get() >= self.inner.write_serial.get()
            && !self.inner.closed.get()
        {
            if !self.inner.read_waiters.wait(cancel).await {
                return Err(ChannelError::ReadCancelled);
            }
        }

        // Step 2.
        if self.inner.closed.get() {
            return Err(ChannelError::Closed);
        }

        // Step 3: policy hook.
        if decline() {
            return Err(ChannelError::ReadCancelled);
        }

        // Step 4.
        let value = self
            .inner
            .slot
            .borrow_mut()
            .take()
            .expect("value_in_transit implies a posted value");
        self.inner.read_serial.set(self.inner.read_serial.get() + 1);
        self.inner.write_completion_waiters.notify_one();
        Ok(value)
    }

    /// Yields values by repeated [`Channel::read`] until the channel
    /// closes or `cancel` fires; both terminate the stream normally rather
    /// than surfacing an error.
    pub fn iterate(&self, cancel: Option<&CancelToken>) -> Iter<T> {
        Iter::new(self.clone(), cancel.cloned())
    }
}
