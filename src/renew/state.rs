//! Renewal results and loop states.

/// Result of one iteration of renewing work.
///
/// The carried value becomes the input of the next iteration
/// (or the final state of the loop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renewal<S> {
    /// Schedule another iteration with this state.
    Continue(S),
    /// Finish the loop with this state.
    Stop(S),
}

impl<S> Renewal<S> {
    /// Returns the carried state.
    pub fn into_state(self) -> S {
        match self {
            Renewal::Continue(s) | Renewal::Stop(s) => s,
        }
    }

    /// True for [`Renewal::Stop`].
    pub fn is_stop(&self) -> bool {
        matches!(self, Renewal::Stop(_))
    }
}

/// Control state of a renewing loop.
///
/// ```text
/// Running ──pause()──► Paused ──resume()──► Running
///    │                   │
///    └──stop()──► Stopped ◄──stop()──┘        (at next iteration boundary)
///
/// any non-terminal ──close()──► Cancelled     (immediately)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RenewState {
    /// Work is invoked on every iteration.
    Running = 0,
    /// The pause step is invoked instead of the work.
    Paused = 1,
    /// Terminal: no further iteration is started.
    Stopped = 2,
    /// Terminal: the in-flight iteration was dropped.
    Cancelled = 3,
}

impl RenewState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => RenewState::Running,
            1 => RenewState::Paused,
            2 => RenewState::Stopped,
            _ => RenewState::Cancelled,
        }
    }

    /// True for `Stopped` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RenewState::Stopped | RenewState::Cancelled)
    }
}

/// How a renewing loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewExit {
    /// Stopped at an iteration boundary.
    Stopped,
    /// Cancelled by `close()`.
    Cancelled,
}

/// Final result of a renewing loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewOutcome<S> {
    /// Last state produced by a completed iteration (or the initial state).
    pub state: S,
    /// How the loop ended.
    pub exit: RenewExit,
    /// Number of completed work iterations.
    pub iterations: u64,
}
