//! Coalescing self-restart job.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::condition::Condition;
use crate::spawn::Spawner;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum JobState {
    Inert,
    InProgress,
    Again,
}

struct Inner {
    state: Cell<JobState>,
    idle: Condition,
}

/// Coalesces overlapping [`RecurrentJob::request`] calls into at most one
/// extra run: N requests arriving while a run is in flight cause exactly
/// one additional run, not N.
///
/// Each run is dispatched as its own detached task (via a caller-supplied
/// [`Spawner`]) rather than as a loop inside the current run, so a run that
/// raises with no `on_error` handler doesn't poison the task driving the
/// next one.
#[derive(Clone)]
pub struct RecurrentJob {
    inner: Rc<Inner>,
}

impl RecurrentJob {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                state: Cell::new(JobState::Inert),
                idle: Condition::new(),
            }),
        }
    }

    /// Requests a run of `op`.
    ///
    /// If the job is idle, starts a run immediately. If a run is already
    /// in flight, marks that one more run is owed once it finishes
    /// (idempotent: further requests while still in flight do nothing).
    pub fn request<Op, Fut, E>(
        &self,
        spawner: &dyn Spawner,
        op: Rc<Op>,
        on_error: Option<Rc<dyn Fn(E)>>,
    ) where
        Op: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: 'static,
    {
        match self.inner.state.get() {
            JobState::Inert => {
                self.inner.state.set(JobState::InProgress);
                self.spawn_run(spawner, op, on_error);
            }
            JobState::InProgress => {
                self.inner.state.set(JobState::Again);
            }
            JobState::Again => {}
        }
    }

    fn spawn_run<Op, Fut, E>(
        &self,
        spawner: &dyn Spawner,
        op: Rc<Op>,
        on_error: Option<Rc<dyn Fn(E)>>,
    ) where
        Op: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<(), E>> + 'static,
        E: 'static,
    {
        let inner = self.inner.clone();
        let job = self.clone();
        spawner.spawn(Box::pin(async move {
            let result = op().await;

            let run_again = match inner.state.get() {
                JobState::Again => {
                    inner.state.set(JobState::InProgress);
                    true
                }
                _ => {
                    inner.state.set(JobState::Inert);
                    inner.idle.notify_all();
                    false
                }
            };

            if let Err(err) = result {
                if let Some(on_error) = &on_error {
                    on_error(err);
                } else {
                    panic!("RecurrentJob run failed with no on_error handler");
                }
            }

            if run_again {
                // A fresh task, not a loop in this one: per-run failures
                // stay isolated to the task that raised them.
                job.spawn_run(spawner, op, on_error);
            }
        }) as Pin<Box<dyn Future<Output = ()>>>);
    }

    /// Suspends until the job is [`JobState::Inert`] (no run in flight and
    /// none owed).
    pub async fn wait(&self) {
        while self.inner.state.get() != JobState::Inert {
            self.inner.idle.wait(None).await;
        }
    }

    /// `true` if a run is currently executing or one is owed.
    pub fn is_running(&self) -> bool {
        self.inner.state.get() != JobState::Inert
    }
}

impl Default for RecurrentJob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::SpawnFn;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn immediate_spawner() -> impl Spawner {
        SpawnFn::new(|mut fut: Pin<Box<dyn Future<Output = ()>>>| {
            let waker = futures::task::noop_waker();
            let mut cx = std::task::Context::from_waker(&waker);
            loop {
                match fut.as_mut().poll(&mut cx) {
                    std::task::Poll::Ready(()) => break,
                    std::task::Poll::Pending => continue,
                }
            }
        })
    }

    /// A spawner that queues futures instead of driving them, so a test
    /// can issue several `request` calls before any run actually executes
    /// and observe the coalescing the state machine performs.
    struct QueueSpawner {
        queue: RefCell<VecDeque<Pin<Box<dyn Future<Output = ()>>>>>,
    }

    impl QueueSpawner {
        fn new() -> Self {
            Self {
                queue: RefCell::new(VecDeque::new()),
            }
        }

        fn drain(&self) {
            let waker = futures::task::noop_waker();
            let mut cx = std::task::Context::from_waker(&waker);
            loop {
                let mut fut = match self.queue.borrow_mut().pop_front() {
                    Some(fut) => fut,
                    None => break,
                };
                // A run that coalesces spawns its follow-up synchronously
                // from inside this poll, pushing straight onto `queue`.
                while fut.as_mut().poll(&mut cx).is_pending() {}
            }
        }
    }

    impl Spawner for QueueSpawner {
        fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()>>>) {
            self.queue.borrow_mut().push_back(fut);
        }
    }

    #[tokio::test]
    async fn overlapping_requests_coalesce_into_one_extra_run() {
        let job = RecurrentJob::new();
        let spawner = QueueSpawner::new();
        let runs = Rc::new(Cell::new(0u32));

        let runs_for_op = runs.clone();
        let op = Rc::new(move || {
            let runs = runs_for_op.clone();
            async move {
                runs.set(runs.get() + 1);
                Ok::<(), ()>(())
            }
        });

        // Three overlapping requests while nothing has run yet: the first
        // starts a run, the second coalesces it into one more, the third
        // is idempotent against the already-coalesced state.
        job.request(&spawner, op.clone(), None);
        job.request(&spawner, op.clone(), None);
        job.request(&spawner, op.clone(), None);
        assert!(job.is_running());

        spawner.drain();
        job.wait().await;

        assert_eq!(runs.get(), 2);
        assert!(!job.is_running());
    }

    #[tokio::test]
    async fn idle_job_runs_exactly_once_per_request() {
        let job = RecurrentJob::new();
        let spawner = immediate_spawner();
        let runs = Rc::new(Cell::new(0u32));

        for _ in 0..3 {
            let runs = runs.clone();
            job.request(
                &spawner,
                Rc::new(move || {
                    let runs = runs.clone();
                    async move {
                        runs.set(runs.get() + 1);
                        Ok::<(), ()>(())
                    }
                }),
                None,
            );
            job.wait().await;
        }
        assert_eq!(runs.get(), 3);
    }

    #[tokio::test]
    async fn on_error_handler_receives_the_failure() {
        let job = RecurrentJob::new();
        let spawner = immediate_spawner();
        let seen: Rc<RefCell<Option<&'static str>>> = Rc::new(RefCell::new(None));

        let seen_for_handler = seen.clone();
        job.request(
            &spawner,
            Rc::new(|| async { Err::<(), &'static str>("boom") }),
            Some(Rc::new(move |e| *seen_for_handler.borrow_mut() = Some(e))
                as Rc<dyn Fn(&'static str)>),
        );
        job.wait().await;

        assert_eq!(*seen.borrow(), Some("boom"));
    }
}
