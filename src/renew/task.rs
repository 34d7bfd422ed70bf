//! # RenewingTask: a task that keeps running.
//!
//! Wraps one async unit of work so that, upon completion, it runs again with
//! the state it returned, unless told to stop, pause or close.
//!
//! ## Loop
//! ```text
//! create() ──► tokio::spawn(drive)
//!
//! loop {
//!   ├─► read control state
//!   │     ├─ Stopped   ─► exit(Stopped, last state)
//!   │     ├─ Cancelled ─► exit(Cancelled, last state)
//!   │     ├─ Paused    ─► pause(state), sleep(pause_interval)
//!   │     └─ Running   ─► work(state)
//!   │                       ├─ Ok(Continue(s)) ─► state = s
//!   │                       ├─ Ok(Stop(s))     ─► state = s, stop()
//!   │                       └─ Err(e)          ─► publish RenewFailed, return Err(e)
//!   ├─► (any await above races the loop token; close() wins immediately)
//!   └─► yield_now()
//! }
//! ```
//!
//! ## Rules
//! - Iterations of one loop run **sequentially** (never overlap).
//! - `stop()` lets the in-flight iteration finish; exactly one more iteration completes.
//! - `close()` drops the in-flight iteration; the outcome keeps the last completed state.
//! - Cancellation is not an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::control::RenewControl;
use super::state::{RenewExit, RenewOutcome, RenewState, Renewal};
use crate::config::DEFAULT_PAUSE_INTERVAL;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};

type WorkFn<S> =
    Box<dyn FnMut(RenewControl, S) -> BoxFuture<'static, Result<Renewal<S>, TaskError>> + Send>;
type PauseFn<S> = Box<dyn FnMut(S) -> BoxFuture<'static, S> + Send>;

/// Builder of a renewing loop.
///
/// # Example
/// ```rust
/// use slotvisor::{RenewExit, Renewal, RenewingTask, TaskError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let handle = RenewingTask::new("count-to-3", 0u32, |n: u32| async move {
///     if n + 1 == 3 {
///         Ok::<_, TaskError>(Renewal::Stop(n + 1))
///     } else {
///         Ok(Renewal::Continue(n + 1))
///     }
/// })
/// .create();
///
/// let outcome = handle.join().await.unwrap();
/// assert_eq!(outcome.state, 3);
/// assert_eq!(outcome.exit, RenewExit::Stopped);
/// # }
/// ```
pub struct RenewingTask<S> {
    name: Arc<str>,
    initial: S,
    work: WorkFn<S>,
    pause: PauseFn<S>,
    pause_interval: Duration,
    bus: Option<Bus>,
    parent: Option<CancellationToken>,
}

impl<S> RenewingTask<S>
where
    S: Clone + Send + 'static,
{
    /// Creates a loop around `work`, starting from `initial`.
    pub fn new<F, Fut>(name: impl Into<Arc<str>>, initial: S, mut work: F) -> Self
    where
        F: FnMut(S) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Renewal<S>, TaskError>> + Send + 'static,
    {
        Self::with_control(name, initial, move |_control, s| work(s))
    }

    /// Like [`new`](Self::new), but `work` also receives the loop's own
    /// [`RenewControl`], so an iteration can stop, pause or close its loop.
    pub fn with_control<F, Fut>(name: impl Into<Arc<str>>, initial: S, mut work: F) -> Self
    where
        F: FnMut(RenewControl, S) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Renewal<S>, TaskError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            initial,
            work: Box::new(move |control, s| work(control, s).boxed()),
            pause: Box::new(|s| futures::future::ready(s).boxed()),
            pause_interval: DEFAULT_PAUSE_INTERVAL,
            bus: None,
            parent: None,
        }
    }

    /// Replaces the no-op pause step.
    pub fn with_pause<P, Fut>(mut self, mut pause: P) -> Self
    where
        P: FnMut(S) -> Fut + Send + 'static,
        Fut: Future<Output = S> + Send + 'static,
    {
        self.pause = Box::new(move |s| pause(s).boxed());
        self
    }

    /// Sets the sleep between pause steps.
    pub fn with_pause_interval(mut self, interval: Duration) -> Self {
        self.pause_interval = interval;
        self
    }

    /// Publishes lifecycle events on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Derives the loop token from `parent`; cancelling it closes the loop.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Spawns the loop on the current tokio runtime.
    ///
    /// Consumes the builder, so a loop is created exactly once.
    pub fn create(self) -> RenewHandle<S> {
        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let control = RenewControl::new(Arc::clone(&self.name), token, self.bus.clone());
        let driver = control.clone();
        let join = tokio::spawn(self.drive(driver));
        RenewHandle { control, join }
    }

    async fn drive(mut self, control: RenewControl) -> Result<RenewOutcome<S>, TaskError> {
        let token = control.token().clone();
        let mut state = self.initial.clone();

        loop {
            if token.is_cancelled() {
                return Ok(finish(&control, state, RenewExit::Cancelled));
            }

            match control.state() {
                RenewState::Stopped => {
                    return Ok(finish(&control, state, RenewExit::Stopped));
                }
                RenewState::Cancelled => {
                    return Ok(finish(&control, state, RenewExit::Cancelled));
                }
                RenewState::Paused => {
                    let step = (self.pause)(state.clone());
                    let interval = self.pause_interval;
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            return Ok(finish(&control, state, RenewExit::Cancelled));
                        }
                        next = async move {
                            let next = step.await;
                            tokio::time::sleep(interval).await;
                            next
                        } => {
                            state = next;
                            control.record_pause();
                        }
                    }
                }
                RenewState::Running => {
                    let step = (self.work)(control.clone(), state.clone());
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            return Ok(finish(&control, state, RenewExit::Cancelled));
                        }
                        res = step => match res {
                            Ok(renewal) => {
                                control.record_iteration();
                                let stop = renewal.is_stop();
                                state = renewal.into_state();
                                if stop {
                                    control.stop();
                                }
                            }
                            Err(e) => {
                                tracing::debug!(task = control.name(), error = %e, "renewing work failed");
                                control.finish(RenewState::Stopped);
                                control.publish_event(
                                    Event::new(EventKind::RenewFailed).with_reason(e.to_string()),
                                );
                                return Err(e);
                            }
                        }
                    }
                }
            }

            tokio::task::yield_now().await;
        }
    }
}

fn finish<S>(control: &RenewControl, state: S, exit: RenewExit) -> RenewOutcome<S> {
    let iterations = control.iterations();
    let (terminal, kind) = match exit {
        RenewExit::Stopped => (RenewState::Stopped, EventKind::RenewStopped),
        RenewExit::Cancelled => (RenewState::Cancelled, EventKind::RenewCancelled),
    };
    control.finish(terminal);
    control.publish_event(Event::new(kind).with_attempt(iterations));
    RenewOutcome {
        state,
        exit,
        iterations,
    }
}

/// Handle of a running renewing loop.
pub struct RenewHandle<S> {
    control: RenewControl,
    join: JoinHandle<Result<RenewOutcome<S>, TaskError>>,
}

impl<S> RenewHandle<S> {
    /// Returns a cloneable control surface.
    pub fn control(&self) -> RenewControl {
        self.control.clone()
    }

    /// Loop name.
    pub fn name(&self) -> &str {
        self.control.name()
    }

    /// See [`RenewControl::stop`].
    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    /// See [`RenewControl::pause`].
    pub fn pause(&self) -> bool {
        self.control.pause()
    }

    /// See [`RenewControl::resume`].
    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    /// See [`RenewControl::task_continue`].
    pub fn task_continue(&self) -> bool {
        self.control.task_continue()
    }

    /// See [`RenewControl::close`].
    pub fn close(&self) -> bool {
        self.control.close()
    }

    /// Current control state.
    pub fn state(&self) -> RenewState {
        self.control.state()
    }

    /// Completed work iterations so far.
    pub fn iterations(&self) -> u64 {
        self.control.iterations()
    }

    /// Completed pause steps so far.
    pub fn pauses(&self) -> u64 {
        self.control.pauses()
    }

    /// True once the loop has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the loop to end.
    ///
    /// A panic inside the work surfaces as [`TaskError::Fatal`].
    pub async fn join(self) -> Result<RenewOutcome<S>, TaskError> {
        match self.join.await {
            Ok(res) => res,
            Err(e) if e.is_cancelled() => Err(TaskError::Canceled),
            Err(e) => Err(TaskError::fatal(format!("renewing loop panicked: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn stop_result_finishes_loop() {
        let handle = RenewingTask::new("t", 0u32, |n: u32| async move {
            Ok::<_, TaskError>(if n == 4 {
                Renewal::Stop(n)
            } else {
                Renewal::Continue(n + 1)
            })
        })
        .create();

        let out = handle.join().await.unwrap();
        assert_eq!(out.state, 4);
        assert_eq!(out.iterations, 5);
        assert_eq!(out.exit, RenewExit::Stopped);
    }

    #[tokio::test]
    async fn error_ends_loop_and_propagates() {
        let handle = RenewingTask::new("t", 0u32, |n: u32| async move {
            if n == 2 {
                Err(TaskError::fail("station offline"))
            } else {
                Ok(Renewal::Continue(n + 1))
            }
        })
        .create();

        let err = handle.join().await.unwrap_err();
        assert_eq!(err, TaskError::fail("station offline"));
    }

    #[tokio::test]
    async fn close_keeps_last_completed_state() {
        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        let handle = RenewingTask::new("t", 0u32, move |n: u32| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                if n >= 2 {
                    std::future::pending::<()>().await;
                }
                Ok::<_, TaskError>(Renewal::Continue(n + 1))
            }
        })
        .create();

        while calls.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
        assert!(handle.close());

        let out = handle.join().await.unwrap();
        assert_eq!(out.exit, RenewExit::Cancelled);
        assert_eq!(out.state, 2);
        assert_eq!(out.iterations, 2);
    }

    #[tokio::test]
    async fn close_from_inside_the_work() {
        let handle = RenewingTask::with_control("t", 0u32, |control: RenewControl, n: u32| async move {
            if n == 3 {
                control.close();
                tokio::task::yield_now().await;
            }
            Ok::<_, TaskError>(Renewal::Continue(n + 1))
        })
        .create();

        let out = handle.join().await.unwrap();
        assert_eq!(out.exit, RenewExit::Cancelled);
        assert_eq!(out.state, 3);
        assert_eq!(out.iterations, 3);
    }

    #[tokio::test]
    async fn parent_token_closes_loop() {
        let parent = CancellationToken::new();
        let handle = RenewingTask::new("t", (), |_: ()| async move {
            tokio::task::yield_now().await;
            Ok::<_, TaskError>(Renewal::Continue(()))
        })
        .with_parent(&parent)
        .create();

        parent.cancel();
        let out = handle.join().await.unwrap();
        assert_eq!(out.exit, RenewExit::Cancelled);
    }
}
