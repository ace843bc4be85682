//! Multi-way select over heterogeneous channels.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use futures::future::join_all;

use crate::cancel::CancelToken;
use crate::channel::{Channel, ChannelError};

type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// One `(channel, handler)` pair passed to [`select`].
///
/// Built with [`SelectArm::new`]; kept opaque because each arm closes over
/// a different channel value type `T`, which `select` itself must stay
/// generic-free over to hold a homogeneous list of arms.
pub struct SelectArm {
    run: Box<dyn FnOnce(Rc<Cell<bool>>, CancelToken) -> LocalBoxFuture<'static, Result<(), ChannelError>>>,
}

impl SelectArm {
    /// Pairs `channel` with `handler`: if this arm wins the race, `handler`
    /// runs (to completion) with the value this arm read.
    pub fn new<T: 'static>(channel: Channel<T>, handler: impl FnOnce(T) + 'static) -> Self {
        Self {
            run: Box::new(move |taken, child_cancel| {
                Box::pin(async move {
                    let mut decline = {
                        let taken = taken.clone();
                        move || {
                            if taken.get() {
                                true
                            } else {
                                taken.set(true);
                                false
                            }
                        }
                    };
                    match channel
                        .read_with_policy(Some(&child_cancel), &mut decline)
                        .await
                    {
                        Ok(value) => {
                            // Claimed the handoff: hasten every sibling
                            // read's exit so at-most-one handler runs even
                            // under scheduler quirks that might otherwise
                            // let two arms both think they've won.
                            child_cancel.cancel();
                            handler(value);
                            Ok(())
                        }
                        Err(ChannelError::ReadCancelled) => Ok(()),
                        Err(other) => Err(other),
                    }
                })
            }),
        }
    }
}

/// Waits for exactly one of `arms` to deliver a value, runs that arm's
/// handler to completion, and returns.
///
/// Implemented as a join over every sibling read rather than a race: only
/// once every sibling has finalised is the shared "claimed" flag and the
/// channels' serial counters guaranteed quiescent.
///
/// A [`ChannelError::ReadCancelled`] from a losing arm is swallowed. Any
/// other error (including a losing arm's channel being closed) propagates
/// and ends the select.
pub async fn select(arms: Vec<SelectArm>, cancel: Option<&CancelToken>) -> Result<(), ChannelError> {
    let taken = Rc::new(Cell::new(false));
    // `CancelToken::child` already seeds an already-cancelled child if
    // `cancel` has already fired, so the external token's state propagates
    // to every sibling read without any extra bookkeeping here.
    let child_cancel = cancel.map(CancelToken::child).unwrap_or_default();

    let futures: Vec<_> = arms
        .into_iter()
        .map(|arm| (arm.run)(taken.clone(), child_cancel.clone()))
        .collect();

    let results = join_all(futures).await;

    let mut first_error = None;
    for result in results {
        if let Err(err) = result {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn exactly_one_handler_runs_per_winning_write() {
        let number_ch = Channel::<i32>::new();
        let string_ch = Channel::<String>::new();
        let bool_ch = Channel::<bool>::new();

        let got_number = Rc::new(Cell::new(false));
        let got_string = Rc::new(Cell::new(false));
        let got_bool = Rc::new(Cell::new(false));

        let writer = {
            let number_ch = number_ch.clone();
            let string_ch = string_ch.clone();
            let bool_ch = bool_ch.clone();
            async move {
                number_ch.write(15, None).await.unwrap();
                string_ch.write("something".to_string(), None).await.unwrap();
                bool_ch.write(true, None).await.unwrap();
            }
        };

        let selector = {
            let got_number = got_number.clone();
            let got_string = got_string.clone();
            let got_bool = got_bool.clone();
            async move {
                while !(got_number.get() && got_string.get() && got_bool.get()) {
                    let arms = vec![
                        SelectArm::new(number_ch.clone(), {
                            let got_number = got_number.clone();
                            move |_v: i32| got_number.set(true)
                        }),
                        SelectArm::new(string_ch.clone(), {
                            let got_string = got_string.clone();
                            move |_v: String| got_string.set(true)
                        }),
                        SelectArm::new(bool_ch.clone(), {
                            let got_bool = got_bool.clone();
                            move |_v: bool| got_bool.set(true)
                        }),
                    ];
                    select(arms, None).await.unwrap();
                }
            }
        };

        tokio::join!(writer, selector);
        assert!(got_number.get());
        assert!(got_string.get());
        assert!(got_bool.get());
    }

    #[tokio::test]
    async fn losing_arms_values_are_not_consumed() {
        let winner = Channel::<i32>::new();
        let loser = Channel::<i32>::new();

        let log = Rc::new(RefCell::new(Vec::new()));

        let writer = {
            let winner = winner.clone();
            async move { winner.write(1, None).await.unwrap() }
        };
        let selector = {
            let log = log.clone();
            let loser = loser.clone();
            async move {
                let arms = vec![
                    SelectArm::new(winner.clone(), {
                        let log = log.clone();
                        move |v| log.borrow_mut().push(v)
                    }),
                    SelectArm::new(loser.clone(), {
                        let log = log.clone();
                        move |v| log.borrow_mut().push(v)
                    }),
                ];
                select(arms, None).await.unwrap();
            }
        };
        tokio::join!(writer, selector);

        assert_eq!(*log.borrow(), vec![1]);
        // The losing arm never consumed anything from `loser`; a later
        // direct write/read on it still rendezvous normally.
        let (write, read) = tokio::join!(loser.write(2, None), loser.read(None));
        assert_eq!(write, Ok(()));
        assert_eq!(read, Ok(2));
    }
}
