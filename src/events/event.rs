//! # Runtime events emitted by renewing loops, the scheduler and the assignator.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Renewal events**: control transitions of a renewing loop (paused, resumed, stopped, cancelled)
//! - **Slot events**: worker start, slot binding/release, slot failure
//! - **Assignment events**: per-item assignator decisions and cycle summaries
//! - **Subscriber events**: overflow and panic of event subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, worker,
//! slot and item identifiers and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use slotvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SlotBound)
//!     .with_worker("k3x9qa")
//!     .with_slot("p0m2zz")
//!     .with_item("ST01");
//!
//! assert_eq!(ev.kind, EventKind::SlotBound);
//! assert_eq!(ev.item.as_deref(), Some("ST01"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Renewal events ===
    /// Renewing loop entered the paused state.
    ///
    /// Sets: `task` (loop name).
    RenewPaused,

    /// Renewing loop left the paused state.
    ///
    /// Sets: `task` (loop name).
    RenewResumed,

    /// Renewing loop finished after a stop request or a `Stop` result.
    ///
    /// Sets: `task`, `attempt` (completed iterations).
    RenewStopped,

    /// Renewing loop was cancelled by `close()`.
    ///
    /// Sets: `task`, `attempt` (completed iterations).
    RenewCancelled,

    /// Renewing loop ended with an error.
    ///
    /// Sets: `task`, `reason`.
    RenewFailed,

    // === Slot events ===
    /// Worker registered its slots and spawned its loops.
    ///
    /// Sets: `worker`.
    WorkerStarted,

    /// Item was bound to a slot.
    ///
    /// Sets: `worker`, `slot`, `item`.
    SlotBound,

    /// Item was released from a slot.
    ///
    /// Sets: `worker`, `slot`, `item`.
    SlotReleased,

    /// Slot work returned an error.
    ///
    /// Sets: `worker`, `slot`, `item` (if bound), `reason`.
    SlotFailed,

    /// Work registration was rejected.
    ///
    /// Sets: `reason`.
    RegistrationRejected,

    // === Assignment events ===
    /// Assignator placed an item on a worker.
    ///
    /// Sets: `worker`, `slot`, `item`, `group` (if any).
    ItemAssigned,

    /// Assignator drained an item but did not place it.
    ///
    /// Sets: `item`, `reason` (`unknown`, `already_assigned`, `group_consumed`, `no_capacity`).
    ItemSkipped,

    /// Assignator finished one cycle.
    ///
    /// Sets: `attempt` (number of items assigned in the cycle).
    CycleCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the renewing loop or subscriber, if applicable.
    pub task: Option<Arc<str>>,
    /// Worker identifier (`ipt`).
    pub worker: Option<Arc<str>>,
    /// Slot identifier (`ico`).
    pub slot: Option<Arc<str>>,
    /// Work item identifier.
    pub item: Option<Arc<str>>,
    /// Group code of the item.
    pub group: Option<Arc<str>>,
    /// Human-readable reason (errors, skip causes, overflow details).
    pub reason: Option<Arc<str>>,
    /// Iteration or item count, depending on the kind.
    pub attempt: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            worker: None,
            slot: None,
            item: None,
            group: None,
            reason: None,
            attempt: None,
        }
    }

    /// Attaches a loop or subscriber name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a worker identifier.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a slot identifier.
    #[inline]
    pub fn with_slot(mut self, slot: impl Into<Arc<str>>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Attaches a work item identifier.
    #[inline]
    pub fn with_item(mut self, item: impl Into<Arc<str>>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Attaches a group code.
    #[inline]
    pub fn with_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an iteration or item count.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::WorkerStarted);
        let b = Event::new(EventKind::WorkerStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn subscriber_helpers_set_kind_and_name() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_event());
        assert_eq!(ev.task.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
