//! # LogWriter: forwards events to `tracing`
//!
//! A subscriber that turns incoming [`Event`]s into structured `tracing`
//! records. Install any `tracing` subscriber to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO slotvisor: worker started worker="k3x9qa"
//! INFO slotvisor: slot bound worker="k3x9qa" slot="p0m2zz" item="ST01"
//! INFO slotvisor: item assigned worker="k3x9qa" slot="p0m2zz" item="ST01" group="A"
//! WARN slotvisor: slot failed worker="k3x9qa" slot="p0m2zz" item="ST01" reason="execution failed: boom"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let worker = e.worker.as_deref().unwrap_or("-");
        let slot = e.slot.as_deref().unwrap_or("-");
        let item = e.item.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::RenewPaused => tracing::debug!(task, "renew paused"),
            EventKind::RenewResumed => tracing::debug!(task, "renew resumed"),
            EventKind::RenewStopped => {
                tracing::info!(task, iterations = e.attempt, "renew stopped")
            }
            EventKind::RenewCancelled => {
                tracing::info!(task, iterations = e.attempt, "renew cancelled")
            }
            EventKind::RenewFailed => tracing::warn!(task, reason, "renew failed"),
            EventKind::WorkerStarted => tracing::info!(worker, "worker started"),
            EventKind::SlotBound => tracing::info!(worker, slot, item, "slot bound"),
            EventKind::SlotReleased => tracing::info!(worker, slot, item, "slot released"),
            EventKind::SlotFailed => {
                tracing::warn!(worker, slot, item, reason, "slot failed")
            }
            EventKind::RegistrationRejected => {
                tracing::warn!(reason, "work registration rejected")
            }
            EventKind::ItemAssigned => tracing::info!(
                worker,
                slot,
                item,
                group = e.group.as_deref().unwrap_or("-"),
                "item assigned"
            ),
            EventKind::ItemSkipped => tracing::debug!(item, reason, "item skipped"),
            EventKind::CycleCompleted => {
                tracing::debug!(assigned = e.attempt, "assignment cycle completed")
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = task, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = task, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
