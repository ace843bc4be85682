//! The three value-shaped error kinds a [`super::Channel`] can raise.

/// Failure modes for [`super::Channel`] operations.
///
/// All three are *expected* outcomes from the crate's point of view.
/// `iterate` and `select` recover from `ReadCancelled` locally and treat
/// `Closed` as graceful termination; callers that `read`/`write` directly
/// see them as ordinary errors.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was closed, either before this call started or while it
    /// was suspended waiting for a handoff.
    #[error("channel closed")]
    Closed,
    /// A `read` was cancelled before a writer handed off a value to it.
    #[error("read cancelled")]
    ReadCancelled,
    /// A `write` was cancelled before a reader completed the handoff.
    #[error("write cancelled")]
    WriteCancelled,
}
