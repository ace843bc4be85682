//! Cooperative single-threaded concurrency primitives.
//!
//! `cosync` is a reference library of the primitives a single-threaded
//! cooperative scheduler (fibers, a hand-rolled event loop, a `!Send`
//! actor runtime) needs to coordinate work: a condition variable, a
//! non-reentrant mutex, a counting semaphore, an unbuffered rendezvous
//! channel with multi-way `select` and iteration, a cancellable `sleep`,
//! and four scheduling helpers built on top of those (`BackoffSession`,
//! `QuotaGovernor`, `ConcurrencyLimiter`, `RecurrentJob`).
//!
//! ## Scheduling model
//!
//! Every primitive here is `!Send + !Sync` by construction: state lives
//! behind `Rc<RefCell<..>>`/`Cell<..>`, never an atomic or an OS lock.
//! Mutations between `.await` points are atomic by construction because
//! there is only ever one logical thread of control polling these
//! futures. Embedding `cosync` in a multi-threaded runtime means driving
//! every instance from a single worker (e.g. `tokio::task::LocalSet`), not
//! sharing one across workers.
//!
//! ## Cancellation
//!
//! [`cancel::CancelToken`] is the cooperative analogue of a cancellation
//! signal threaded through every suspension point. Cancelling a token is
//! idempotent and runs every subscriber immediately; derived
//! ([`cancel::CancelToken::child`]) tokens propagate it downward.
//!
//! ## Example
//!
//! ```
//! # use cosync::{channel::Channel};
//! # use tokio::join;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ch = Channel::<i32>::new();
//! let writer = ch.write(7, None);
//! let reader = ch.read(None);
//! let (write_result, read_result) = join!(writer, reader);
//! assert_eq!(write_result, Ok(()));
//! assert_eq!(read_result, Ok(7));
//! # }
//! ```

pub mod backoff;
pub mod cancel;
pub mod channel;
pub mod clock;
pub mod condition;
pub mod limiter;
pub mod mutex;
pub mod quota;
pub mod recurrent;
mod semaphore;
pub mod sleep;
pub mod spawn;

pub use backoff::BackoffSession;
pub use cancel::{CancelToken, SubscriptionId};
pub use channel::{Channel, ChannelError, SelectArm, select};
pub use clock::{Clock, SystemClock, TimerHandle};
pub use condition::Condition;
pub use limiter::ConcurrencyLimiter;
pub use mutex::{Mutex, WithLockError};
pub use quota::QuotaGovernor;
pub use recurrent::RecurrentJob;
pub use semaphore::{Semaphore, WithSlotError};
pub use sleep::sleep;
pub use spawn::{SpawnFn, Spawner};
