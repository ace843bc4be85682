//! Detached-task scheduling boundary.
//!
//! [`ConcurrencyLimiter::run`](crate::limiter::ConcurrencyLimiter::run) and
//! [`RecurrentJob`](crate::recurrent::RecurrentJob) both need to kick off
//! work that outlives the call that started it, without this crate adopting
//! a specific async runtime. Callers supply a [`Spawner`] that forwards to
//! whatever executor is actually driving the cooperative thread (a
//! `tokio::task::spawn_local`, a hand-rolled fiber scheduler, and so on).

use std::future::Future;
use std::pin::Pin;

/// Schedules a future to run to completion independently of the caller.
///
/// Implementations must poll `fut` to completion eventually; they are not
/// required to do so before `spawn` returns.
pub trait Spawner {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()>>>);
}

/// A [`Spawner`] built from a plain closure, for callers that don't want to
/// define a dedicated type.
pub struct SpawnFn<F>(F);

impl<F> SpawnFn<F>
where
    F: Fn(Pin<Box<dyn Future<Output = ()>>>),
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Spawner for SpawnFn<F>
where
    F: Fn(Pin<Box<dyn Future<Output = ()>>>),
{
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()>>>) {
        (self.0)(fut)
    }
}
