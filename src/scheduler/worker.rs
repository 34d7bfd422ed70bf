//! # WorkerHandle: owner of one worker's loops.
//!
//! Returned by [`TaskScheduler::manage_tasks`](crate::TaskScheduler::manage_tasks).
//! Holds the control of every slot loop plus the reconciliation loop, and the
//! worker token they all derive from.
//!
//! ## Join
//! ```text
//! join()
//!   ├─► wait every loop (FuturesUnordered)
//!   │     └─ first Err ─► cancel worker token, keep draining
//!   ├─► cleanup: remove worker from table, forget ids
//!   └─► Ok(()) or the first failure as SchedulerError::Task
//! ```

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use super::table::{SlotId, WorkerId};
use super::work::Leg;
use crate::error::{SchedulerError, TaskError};
use crate::renew::RenewControl;

const MANAGER: &str = "manager";

/// One renewing loop owned by a worker.
pub(crate) struct LoopHandle {
    slot: Option<SlotId>,
    leg: Option<Leg>,
    control: RenewControl,
    join: BoxFuture<'static, Result<(), TaskError>>,
}

impl LoopHandle {
    /// `slot`/`leg` are `None` for the reconciliation loop.
    pub(crate) fn new(
        slot: Option<SlotId>,
        leg: Option<Leg>,
        control: RenewControl,
        join: BoxFuture<'static, Result<(), TaskError>>,
    ) -> Self {
        Self {
            slot,
            leg,
            control,
            join,
        }
    }
}

/// Handle of a managed worker.
pub struct WorkerHandle {
    worker: WorkerId,
    slots: Vec<SlotId>,
    loops: Vec<LoopHandle>,
    token: CancellationToken,
    cleanup: BoxFuture<'static, ()>,
}

impl WorkerHandle {
    pub(crate) fn new(
        worker: WorkerId,
        slots: Vec<SlotId>,
        loops: Vec<LoopHandle>,
        token: CancellationToken,
        cleanup: BoxFuture<'static, ()>,
    ) -> Self {
        Self {
            worker,
            slots,
            loops,
            token,
            cleanup,
        }
    }

    /// Worker identifier (`ipt`).
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Slot identifiers (`ico`), in allocation order.
    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    /// Controls of every loop, reconciliation loop last.
    pub fn controls(&self) -> Vec<RenewControl> {
        self.loops.iter().map(|l| l.control.clone()).collect()
    }

    /// Control of the loop driving `leg` on `slot`.
    pub fn slot_control(&self, slot: &str, leg: Leg) -> Option<RenewControl> {
        self.loops
            .iter()
            .find(|l| l.slot.as_deref() == Some(slot) && l.leg == Some(leg))
            .map(|l| l.control.clone())
    }

    /// Control of the reconciliation loop.
    pub fn manager_control(&self) -> Option<RenewControl> {
        self.loops
            .iter()
            .find(|l| l.slot.is_none())
            .map(|l| l.control.clone())
    }

    /// Pauses every slot loop; returns how many changed state.
    pub fn pause(&self) -> usize {
        self.slot_loops().filter(|c| c.pause()).count()
    }

    /// Resumes every paused slot loop; returns how many changed state.
    pub fn resume(&self) -> usize {
        self.slot_loops().filter(|c| c.resume()).count()
    }

    /// Stops every loop after its in-flight iteration.
    pub fn stop(&self) {
        for l in &self.loops {
            l.control.stop();
        }
        tracing::debug!(worker = %self.worker, "worker stop requested");
    }

    /// Closes every loop immediately.
    pub fn close(&self) {
        self.token.cancel();
        for l in &self.loops {
            l.control.close();
        }
        tracing::debug!(worker = %self.worker, "worker close requested");
    }

    /// True once the worker token was cancelled.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    fn slot_loops(&self) -> impl Iterator<Item = &RenewControl> {
        self.loops
            .iter()
            .filter(|l| l.slot.is_some())
            .map(|l| &l.control)
    }

    /// Waits for every loop, then retires the worker.
    ///
    /// The first loop failure closes the remaining loops and is returned.
    pub async fn join(self) -> Result<(), SchedulerError> {
        let Self {
            worker,
            loops,
            token,
            cleanup,
            ..
        } = self;

        let mut pending: FuturesUnordered<_> = loops
            .into_iter()
            .map(|l| {
                let slot = l.slot;
                async move { (slot, l.join.await) }
            })
            .collect();

        let mut first: Option<SchedulerError> = None;
        while let Some((slot, res)) = pending.next().await {
            match res {
                Ok(()) | Err(TaskError::Canceled) => {}
                Err(source) => {
                    let slot = slot.unwrap_or_else(|| MANAGER.to_string());
                    tracing::warn!(worker = %worker, slot = %slot, error = %source, "worker loop failed; closing worker");
                    token.cancel();
                    if first.is_none() {
                        first = Some(SchedulerError::Task {
                            worker: worker.clone(),
                            slot,
                            source,
                        });
                    }
                }
            }
        }

        cleanup.await;
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker", &self.worker)
            .field("slots", &self.slots)
            .field("loops", &self.loops.len())
            .field("closed", &self.token.is_cancelled())
            .finish()
    }
}
