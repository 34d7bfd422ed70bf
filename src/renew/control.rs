//! # Shared control surface of a renewing loop.
//!
//! [`RenewControl`] is cheap to clone and may be moved into the work itself,
//! so a loop can stop, pause or close itself from inside an iteration.
//!
//! ## Rules
//! - Transitions are atomic (`compare_exchange`), idempotent, and never leave a terminal state.
//! - `stop()`/`pause()`/`resume()` are observed at the next iteration boundary.
//! - `close()` also cancels the loop token, which drops the in-flight iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use super::state::RenewState;
use crate::events::{Bus, Event, EventKind};

struct Inner {
    name: Arc<str>,
    state: AtomicU8,
    finished: AtomicBool,
    iterations: AtomicU64,
    pauses: AtomicU64,
    token: CancellationToken,
    bus: Option<Bus>,
}

/// Control handle of one renewing loop.
#[derive(Clone)]
pub struct RenewControl {
    inner: Arc<Inner>,
}

impl RenewControl {
    pub(crate) fn new(name: Arc<str>, token: CancellationToken, bus: Option<Bus>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                state: AtomicU8::new(RenewState::Running as u8),
                finished: AtomicBool::new(false),
                iterations: AtomicU64::new(0),
                pauses: AtomicU64::new(0),
                token,
                bus,
            }),
        }
    }

    /// Loop name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current control state.
    pub fn state(&self) -> RenewState {
        RenewState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// True once the loop has returned.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Completed work iterations so far.
    pub fn iterations(&self) -> u64 {
        self.inner.iterations.load(Ordering::Acquire)
    }

    /// Completed pause steps so far.
    pub fn pauses(&self) -> u64 {
        self.inner.pauses.load(Ordering::Acquire)
    }

    /// Requests termination after the current iteration.
    ///
    /// Returns `true` if this call changed the state.
    pub fn stop(&self) -> bool {
        let changed = self.transition(|s| match s {
            RenewState::Running | RenewState::Paused => Some(RenewState::Stopped),
            _ => None,
        });
        if changed {
            tracing::debug!(task = %self.inner.name, "stop requested");
        }
        changed
    }

    /// Requests the pause step instead of the work from the next iteration on.
    ///
    /// Returns `true` if this call changed the state.
    pub fn pause(&self) -> bool {
        let changed = self.transition(|s| match s {
            RenewState::Running => Some(RenewState::Paused),
            _ => None,
        });
        if changed {
            self.publish(EventKind::RenewPaused);
        }
        changed
    }

    /// Leaves the paused state.
    ///
    /// Returns `true` if this call changed the state.
    pub fn resume(&self) -> bool {
        let changed = self.transition(|s| match s {
            RenewState::Paused => Some(RenewState::Running),
            _ => None,
        });
        if changed {
            self.publish(EventKind::RenewResumed);
        }
        changed
    }

    /// Alias of [`resume`](Self::resume).
    #[inline]
    pub fn task_continue(&self) -> bool {
        self.resume()
    }

    /// Cancels the loop immediately, dropping the in-flight iteration.
    ///
    /// No-op once the loop has finished.
    pub fn close(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        let changed = self.transition(|s| match s {
            RenewState::Cancelled => None,
            _ => Some(RenewState::Cancelled),
        });
        self.inner.token.cancel();
        changed
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(crate) fn record_iteration(&self) -> u64 {
        self.inner.iterations.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn record_pause(&self) {
        self.inner.pauses.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks the loop as returned and forces the state to match its exit.
    pub(crate) fn finish(&self, state: RenewState) {
        self.inner.state.store(state as u8, Ordering::Release);
        self.inner.finished.store(true, Ordering::Release);
    }

    pub(crate) fn publish(&self, kind: EventKind) {
        if let Some(bus) = &self.inner.bus {
            bus.publish(Event::new(kind).with_task(Arc::clone(&self.inner.name)));
        }
    }

    pub(crate) fn publish_event(&self, ev: Event) {
        if let Some(bus) = &self.inner.bus {
            bus.publish(ev.with_task(Arc::clone(&self.inner.name)));
        }
    }

    fn transition(&self, f: impl Fn(RenewState) -> Option<RenewState>) -> bool {
        self.inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                f(RenewState::from_u8(raw)).map(|s| s as u8)
            })
            .is_ok()
    }
}

impl std::fmt::Debug for RenewControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewControl")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("iterations", &self.iterations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> RenewControl {
        RenewControl::new("t".into(), CancellationToken::new(), None)
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let c = control();
        assert!(c.pause());
        assert!(!c.pause());
        assert_eq!(c.state(), RenewState::Paused);
        assert!(c.task_continue());
        assert!(!c.resume());
        assert_eq!(c.state(), RenewState::Running);
    }

    #[test]
    fn terminal_states_are_sticky() {
        let c = control();
        assert!(c.stop());
        assert!(!c.stop());
        assert!(!c.pause());
        assert!(!c.resume());
        assert_eq!(c.state(), RenewState::Stopped);

        assert!(c.close());
        assert_eq!(c.state(), RenewState::Cancelled);
        assert!(!c.stop());
        assert!(c.token().is_cancelled());
    }

    #[test]
    fn close_after_finish_is_noop() {
        let c = control();
        c.finish(RenewState::Stopped);
        assert!(!c.close());
        assert_eq!(c.state(), RenewState::Stopped);
        assert!(!c.token().is_cancelled());
    }
}
