//! Cancellable timer.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::cancel::{CancelToken, SubscriptionId};
use crate::clock::{Clock, TimerHandle};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Pending,
    Elapsed,
    Cancelled,
}

struct Shared {
    resolution: Resolution,
    waker: Option<Waker>,
}

/// Suspends the caller for `duration_millis`, or until `cancel` fires.
///
/// Resolves to `true` if the full duration elapsed, `false` if cancelled.
/// If `cancel` is already cancelled on entry, resolves to `false`
/// immediately without ever scheduling a timer.
pub fn sleep<'a>(
    clock: &'a dyn Clock,
    duration_millis: f64,
    cancel: Option<&'a CancelToken>,
) -> Sleep<'a> {
    Sleep {
        clock,
        duration_millis,
        cancel: cancel.cloned(),
        armed: None,
    }
}

struct Armed {
    timer: Box<dyn TimerHandle>,
    shared: Arc<Mutex<Shared>>,
    cancel_sub: Option<SubscriptionId>,
}

/// Future returned by [`sleep`].
///
/// The timer itself crosses a real OS-thread boundary (see
/// [`crate::clock::SystemClock`]), unlike every other suspension point in
/// this crate, which is why its shared state uses `Arc<Mutex<..>>` instead
/// of the `Rc<RefCell<..>>` the cooperative-thread primitives use
/// elsewhere.
#[must_use = "futures do nothing unless polled"]
pub struct Sleep<'a> {
    clock: &'a dyn Clock,
    duration_millis: f64,
    cancel: Option<CancelToken>,
    armed: Option<Armed>,
}

impl Future for Sleep<'_> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.armed.is_none() {
            if let Some(cancel) = &this.cancel {
                if cancel.is_cancelled() {
                    return Poll::Ready(false);
                }
            }

            let shared = Arc::new(Mutex::new(Shared {
                resolution: Resolution::Pending,
                waker: Some(cx.waker().clone()),
            }));

            let shared_for_timer = shared.clone();
            let timer = this.clock.schedule(
                this.duration_millis,
                Box::new(move || {
                    let waker = {
                        let mut s = shared_for_timer.lock().unwrap();
                        if s.resolution == Resolution::Pending {
                            s.resolution = Resolution::Elapsed;
                            s.waker.take()
                        } else {
                            None
                        }
                    };
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                }),
            );

            let cancel_sub = this.cancel.as_ref().map(|token| {
                let shared_for_cancel = shared.clone();
                token.subscribe(move || {
                    let waker = {
                        let mut s = shared_for_cancel.lock().unwrap();
                        if s.resolution == Resolution::Pending {
                            s.resolution = Resolution::Cancelled;
                            s.waker.take()
                        } else {
                            None
                        }
                    };
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                })
            });

            this.armed = Some(Armed {
                timer,
                shared,
                cancel_sub,
            });
        }

        let armed = this.armed.as_ref().expect("just armed");
        let mut shared = armed.shared.lock().unwrap();
        match shared.resolution {
            Resolution::Pending => {
                shared.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Resolution::Elapsed => Poll::Ready(true),
            Resolution::Cancelled => Poll::Ready(false),
        }
    }
}

impl Drop for Sleep<'_> {
    fn drop(&mut self) {
        // One-shot resolution, no leaks on any exit path: cancel the timer
        // handle (a no-op if it already fired) and unsubscribe from the
        // cancel token.
        if let Some(armed) = self.armed.take() {
            armed.timer.cancel();
            if let (Some(cancel), Some(sub_id)) = (&self.cancel, armed.cancel_sub) {
                cancel.unsubscribe(sub_id);
            }
        }
    }
}
