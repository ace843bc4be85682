//! Iteration over a [`super::Channel`]'s values.

use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;

use crate::cancel::CancelToken;
use crate::channel::{Channel, ChannelError};

/// Yields values read from a [`Channel`] until it closes or `cancel`
/// fires.
///
/// Built by [`Channel::iterate`]. Exposed as a plain `next()` method so the
/// crate's core doesn't require the `futures` `Stream` trait; with the
/// `async` feature enabled, [`Iter`] additionally implements
/// [`futures::Stream`] so it composes with `StreamExt` combinators.
pub struct Iter<T> {
    channel: Channel<T>,
    cancel: Option<CancelToken>,
    #[cfg(feature = "async")]
    pending: Option<Pin<Box<dyn Future<Output = Option<Result<T, ChannelError>>>>>>,
}

impl<T> Iter<T> {
    pub(super) fn new(channel: Channel<T>, cancel: Option<CancelToken>) -> Self {
        Self {
            channel,
            cancel,
            #[cfg(feature = "async")]
            pending: None,
        }
    }

    /// Reads the next value, or `None` once the channel closes or `cancel`
    /// fires.
    ///
    /// A [`ChannelError::ReadCancelled`] or [`ChannelError::Closed`]
    /// terminates iteration normally (returns `None`) rather than being
    /// re-raised; any other error propagates.
    pub async fn next(&mut self) -> Option<Result<T, ChannelError>> {
        read_once(self.channel.clone(), self.cancel.clone()).await
    }
}

async fn read_once<T>(
    channel: Channel<T>,
    cancel: Option<CancelToken>,
) -> Option<Result<T, ChannelError>> {
    if let Some(cancel) = &cancel {
        if cancel.is_cancelled() {
            return None;
        }
    }
    match channel.read(cancel.as_ref()).await {
        Ok(value) => Some(Ok(value)),
        Err(ChannelError::ReadCancelled | ChannelError::Closed) => None,
        Err(other) => Some(Err(other)),
    }
}

#[cfg(feature = "async")]
impl<T: 'static> futures::Stream for Iter<T> {
    type Item = Result<T, ChannelError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        // `Iter` owns its channel handle and cancel token by value (both
        // cheaply `Clone`), so the pending read future is stored
        // independently of `self`'s borrow rather than self-referentially,
        // and survives across `Pending` polls instead of being rebuilt
        // (which would silently drop its registration on the channel's
        // wait-set and lose the wakeup).
        let this = self.get_mut();
        let fut = this
            .pending
            .get_or_insert_with(|| Box::pin(read_once(this.channel.clone(), this.cancel.clone())));
        match fut.as_mut().poll(cx) {
            std::task::Poll::Ready(item) => {
                this.pending = None;
                std::task::Poll::Ready(item)
            }
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}
