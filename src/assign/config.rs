//! # Assignator configuration.
//!
//! ## Sentinel values
//! - `ts = 0s` → clamped to 1ms
//! - `groups` is only consulted under [`Distribution::Group`]

use std::time::Duration;

/// How drained items are filtered before placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distribution {
    /// Place an item only if its group code is still listed; each code is
    /// consumed by its first successful placement.
    Group,
    /// Place every known item, bounded by slot capacity.
    #[default]
    All,
}

impl Distribution {
    pub fn as_label(self) -> &'static str {
        match self {
            Distribution::Group => "group",
            Distribution::All => "all",
        }
    }
}

/// Configuration of an [`Assignator`](crate::Assignator).
#[derive(Clone, Debug)]
pub struct AssignatorConfig {
    /// Interval between assignment cycles.
    pub ts: Duration,

    /// Filtering mode.
    pub distribution: Distribution,

    /// Group codes still open under [`Distribution::Group`].
    pub groups: Vec<String>,

    /// Put items that found no free slot back on the inbound queue.
    ///
    /// A requeued item counts as unfinished again, so
    /// [`QueueHandle::join`](crate::QueueHandle::join) keeps waiting while
    /// every slot is full. With `false` a capacity miss is dropped once it is
    /// marked done, and `join` returns after the cycle that drained it.
    pub requeue_unassigned: bool,
}

impl AssignatorConfig {
    /// Returns the cycle interval clamped to a minimum of 1ms.
    #[inline]
    pub fn cycle_interval(&self) -> Duration {
        self.ts.max(Duration::from_millis(1))
    }

    /// Group mode with the given open codes.
    pub fn group<I, G>(groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        Self {
            distribution: Distribution::Group,
            groups: groups.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl Default for AssignatorConfig {
    fn default() -> Self {
        Self {
            ts: Duration::from_secs(10),
            distribution: Distribution::All,
            groups: Vec::new(),
            requeue_unassigned: true,
        }
    }
}
