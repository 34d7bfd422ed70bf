//! # Assignator: places queued items into free slots.
//!
//! Bridges the inbound [`WorkQueue`] to the [`TaskScheduler`]'s slot capacity
//! and reports each placement on the outbound channel.
//!
//! ## Cycle
//! ```text
//! new_process(token)
//! loop {
//!   ├─► sleep(ts) (cancellable)
//!   └─► run_cycle()
//!         ├─► snapshot bound items
//!         ├─► drain qsize() items (try_get)
//!         ├─► per item:
//!         │     ├─ not known          ─► drop          (ItemSkipped: unknown)
//!         │     ├─ already bound      ─► skip          (ItemSkipped: already_assigned)
//!         │     │    (checked again under the table guard)
//!         │     ├─ group not open     ─► skip          (ItemSkipped: group_consumed)   [Group]
//!         │     ├─ no worker fits     ─► requeue       (ItemSkipped: no_capacity)
//!         │     └─ first-fit worker   ─► under one table guard:
//!         │                               add_task → set_init → add_sta_assigned
//!         │                              consume group [Group] / count [All]
//!         │                              send {station, core, added: true}
//!         ├─► requeue capacity misses
//!         └─► task_done() × drained
//! }
//! ```
//!
//! ## Rules
//! - Worker choice is first-fit in registration order, never least-loaded.
//! - A group code is consumed by its first placement and never reopened.
//! - Any error ends the cycle and the loop; drained items are still marked done.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::{AssignatorConfig, Distribution};
use super::known::{KnownItems, WorkItem};
use super::queue::{QueueHandle, WorkQueue};
use super::record::{AssignmentRecord, CycleReport};
use crate::error::AssignError;
use crate::events::{Event, EventKind};
use crate::scheduler::{ItemId, SlotId, TaskScheduler, WorkerId};

enum Skip {
    Unknown,
    AlreadyAssigned,
    GroupConsumed,
    NoCapacity,
}

impl Skip {
    fn as_label(&self) -> &'static str {
        match self {
            Skip::Unknown => "unknown",
            Skip::AlreadyAssigned => "already_assigned",
            Skip::GroupConsumed => "group_consumed",
            Skip::NoCapacity => "no_capacity",
        }
    }
}

/// Periodic placement of queued items.
pub struct Assignator<S: Send + 'static> {
    cfg: AssignatorConfig,
    scheduler: Arc<TaskScheduler<S>>,
    inbound: WorkQueue,
    outbound: mpsc::UnboundedSender<AssignmentRecord>,
    known: KnownItems,
    groups: Mutex<Vec<String>>,
    assigned_total: AtomicU64,
}

impl<S> Assignator<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    pub fn new(
        scheduler: Arc<TaskScheduler<S>>,
        inbound: WorkQueue,
        outbound: mpsc::UnboundedSender<AssignmentRecord>,
        known: KnownItems,
        cfg: AssignatorConfig,
    ) -> Self {
        Self {
            groups: Mutex::new(cfg.groups.clone()),
            cfg,
            scheduler,
            inbound,
            outbound,
            known,
            assigned_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AssignatorConfig {
        &self.cfg
    }

    /// Producer handle of the inbound queue.
    pub fn queue(&self) -> QueueHandle {
        self.inbound.handle()
    }

    pub fn known(&self) -> &KnownItems {
        &self.known
    }

    /// Group codes not consumed yet.
    pub fn open_groups(&self) -> Vec<String> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Items placed since creation.
    pub fn assigned_total(&self) -> u64 {
        self.assigned_total.load(Ordering::Relaxed)
    }

    /// Runs cycles every `ts` until `token` is cancelled or a cycle fails.
    pub async fn new_process(&self, token: CancellationToken) -> Result<(), AssignError> {
        let interval = self.cfg.cycle_interval();
        tracing::info!(
            distribution = self.cfg.distribution.as_label(),
            interval_ms = interval.as_millis() as u64,
            "assignator started"
        );
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(assigned_total = self.assigned_total(), "assignator stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }

            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, label = e.as_label(), "assignment cycle failed");
                return Err(e);
            }
        }
    }

    /// Spawns [`new_process`](Self::new_process) on the current runtime.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<Result<(), AssignError>> {
        tokio::spawn(async move { self.new_process(token).await })
    }

    /// One assignment cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, AssignError> {
        let mut assigned = self.scheduler.table().assigned_items().await;

        let pending = self.inbound.qsize();
        let mut drained = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.inbound.try_get() {
                Some(item) => drained.push(item),
                None => break,
            }
        }

        let mut report = CycleReport {
            drained: drained.len(),
            ..CycleReport::default()
        };
        let mut requeue = Vec::new();
        let placed = self
            .place_all(&drained, &mut assigned, &mut report, &mut requeue)
            .await;

        if self.cfg.requeue_unassigned {
            report.requeued = requeue.len();
            for item in requeue {
                self.inbound.put(item);
            }
        }
        for _ in 0..drained.len() {
            self.inbound.task_done();
        }
        placed?;

        self.scheduler.bus().publish(
            Event::new(EventKind::CycleCompleted).with_attempt(report.assigned_count() as u64),
        );
        tracing::debug!(
            drained = report.drained,
            assigned = report.assigned_count(),
            unknown = report.unknown,
            filtered = report.filtered,
            no_capacity = report.no_capacity,
            "assignment cycle completed"
        );
        Ok(report)
    }

    async fn place_all(
        &self,
        drained: &[ItemId],
        assigned: &mut HashSet<ItemId>,
        report: &mut CycleReport,
        requeue: &mut Vec<ItemId>,
    ) -> Result<(), AssignError> {
        for id in drained {
            let skip = match self.known.get(id).await {
                None => Some(Skip::Unknown),
                Some(_) if assigned.contains(id) => Some(Skip::AlreadyAssigned),
                Some(item) if !self.group_open(&item) => Some(Skip::GroupConsumed),
                Some(item) => match self.place(&item).await? {
                    Ok((worker, slot)) => {
                        assigned.insert(item.id.clone());
                        report.assigned.push((item.id.clone(), worker, slot));
                        None
                    }
                    Err(skip) => {
                        if matches!(skip, Skip::AlreadyAssigned) {
                            assigned.insert(item.id.clone());
                        }
                        Some(skip)
                    }
                },
            };

            if let Some(skip) = skip {
                match skip {
                    Skip::Unknown => report.unknown += 1,
                    Skip::AlreadyAssigned => report.already_assigned += 1,
                    Skip::GroupConsumed => report.filtered += 1,
                    Skip::NoCapacity => {
                        report.no_capacity += 1;
                        requeue.push(id.clone());
                    }
                }
                tracing::debug!(item = %id, reason = skip.as_label(), "item skipped");
                self.scheduler.bus().publish(
                    Event::new(EventKind::ItemSkipped)
                        .with_item(id.as_str())
                        .with_reason(skip.as_label()),
                );
            }
        }
        Ok(())
    }

    fn group_open(&self, item: &WorkItem) -> bool {
        match self.cfg.distribution {
            Distribution::All => true,
            Distribution::Group => item.group.as_ref().is_some_and(|g| {
                self.groups
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(g)
            }),
        }
    }

    /// Binds `item` to the first worker with a free slot.
    ///
    /// Binding is checked again under the guard; the cycle snapshot may be stale.
    async fn place(
        &self,
        item: &WorkItem,
    ) -> Result<Result<(WorkerId, SlotId), Skip>, AssignError> {
        let limit = self.scheduler.lnproc();
        let (worker, slot) = {
            let mut table = self.scheduler.table().lock().await;
            if table.locate(&item.id).is_some() {
                return Ok(Err(Skip::AlreadyAssigned));
            }
            let Some(worker) = table.first_fit(limit) else {
                return Ok(Err(Skip::NoCapacity));
            };
            let Some(slot) = table.free_slot(&worker)? else {
                return Ok(Err(Skip::NoCapacity));
            };
            table.add_task(&item.id, &worker)?;
            table.set_init(&item.id);
            table.add_sta_assigned(&worker, &slot, &item.id)?;
            (worker, slot)
        };

        match self.cfg.distribution {
            Distribution::Group => {
                if let Some(group) = &item.group {
                    self.groups
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retain(|g| g != group);
                }
            }
            Distribution::All => {}
        }
        let total = self.assigned_total.fetch_add(1, Ordering::Relaxed) + 1;

        self.outbound
            .send(AssignmentRecord::added(item.id.as_str(), worker.as_str()))
            .map_err(|_| AssignError::OutboundClosed)?;

        let mut ev = Event::new(EventKind::ItemAssigned)
            .with_worker(worker.as_str())
            .with_slot(slot.as_str())
            .with_item(item.id.as_str())
            .with_attempt(total);
        if let Some(group) = &item.group {
            ev = ev.with_group(group.as_str());
        }
        self.scheduler.bus().publish(ev);
        tracing::info!(item = %item.id, worker = %worker, slot = %slot, total, "item assigned");

        Ok(Ok((worker, slot)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scheduler::{SlotContext, SlotFn, SlotStep};

    fn scheduler(lnproc: usize) -> Arc<TaskScheduler<()>> {
        let sched = TaskScheduler::new(SchedulerConfig {
            lnproc,
            ..SchedulerConfig::default()
        });
        sched
            .set_new_run_task(
                SlotFn::arc("noop", |_ctx: SlotContext, s: ()| async move {
                    Ok::<_, crate::TaskError>(SlotStep::Continue(s))
                }),
                None,
                None,
            )
            .unwrap();
        sched
    }

    async fn register(sched: &TaskScheduler<()>, worker: &str, slots: &[&str]) {
        sched
            .table()
            .lock()
            .await
            .register_worker(worker, slots.iter().map(|s| s.to_string()).collect())
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_items_are_dropped_and_marked_done() {
        let sched = scheduler(2);
        register(&sched, "w1", &["a", "b"]).await;
        let (queue, producer) = WorkQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let asg = Assignator::new(sched, queue, tx, KnownItems::new(), AssignatorConfig::default());

        producer.put("ghost");
        let report = asg.run_cycle().await.unwrap();
        assert_eq!(report.unknown, 1);
        assert_eq!(report.requeued, 0);
        assert_eq!(producer.unfinished(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn capacity_misses_are_requeued() {
        let sched = scheduler(1);
        register(&sched, "w1", &["a"]).await;
        let (queue, producer) = WorkQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let known: KnownItems = [WorkItem::new("s1"), WorkItem::new("s2")]
            .into_iter()
            .collect();
        let asg = Assignator::new(sched.clone(), queue, tx, known, AssignatorConfig::default());

        producer.put("s1");
        producer.put("s2");
        let report = asg.run_cycle().await.unwrap();
        assert_eq!(report.assigned_count(), 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(producer.unfinished(), 1);

        // Free the slot; the requeued item is placed next cycle.
        sched.release("s1").await;
        let report = asg.run_cycle().await.unwrap();
        assert_eq!(report.assigned[0].0, "s2");
        assert_eq!(asg.assigned_total(), 2);
    }

    #[tokio::test]
    async fn closed_outbound_is_fatal_but_items_are_done() {
        let sched = scheduler(1);
        register(&sched, "w1", &["a"]).await;
        let (queue, producer) = WorkQueue::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let known: KnownItems = [WorkItem::new("s1")].into_iter().collect();
        let asg = Assignator::new(sched, queue, tx, known, AssignatorConfig::default());

        producer.put("s1");
        let err = asg.run_cycle().await.unwrap_err();
        assert!(matches!(err, AssignError::OutboundClosed));
        assert_eq!(producer.unfinished(), 0);
    }

    #[tokio::test]
    async fn item_bound_after_snapshot_is_skipped() {
        let sched = scheduler(2);
        register(&sched, "w1", &["a", "b"]).await;
        let (queue, producer) = WorkQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let known: KnownItems = [WorkItem::new("s1"), WorkItem::new("s2")]
            .into_iter()
            .collect();
        let asg = Assignator::new(sched.clone(), queue, tx, known, AssignatorConfig::default());

        // Listed on w1 and bound by reconciliation after the cycle looked.
        sched.add_task("s1", "w1").await.unwrap();
        assert!(asg.scheduler.table().assigned_items().await.is_empty());
        assert_eq!(sched.process_sta_manager("w1").await.unwrap(), 1);

        let outcome = asg.place(&WorkItem::new("s1")).await.unwrap();
        assert!(matches!(outcome, Err(Skip::AlreadyAssigned)));
        assert_eq!(
            sched.table().read().await.locate("s1"),
            Some(("w1".to_string(), "a".to_string()))
        );
        assert!(rx.try_recv().is_err());

        // The rest of the drain still gets placed.
        producer.put("s1");
        producer.put("s2");
        let report = asg.run_cycle().await.unwrap();
        assert_eq!(report.already_assigned, 1);
        assert_eq!(report.assigned_count(), 1);
        assert_eq!(rx.try_recv().unwrap(), AssignmentRecord::added("s2", "w1"));
        assert_eq!(producer.unfinished(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_ends_new_process() {
        let sched = scheduler(1);
        register(&sched, "w1", &["a"]).await;
        let (queue, producer) = WorkQueue::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let known: KnownItems = [WorkItem::new("s1")].into_iter().collect();
        let asg = Arc::new(Assignator::new(
            sched,
            queue,
            tx,
            known,
            AssignatorConfig {
                ts: Duration::from_secs(1),
                ..AssignatorConfig::default()
            },
        ));
        let token = CancellationToken::new();
        let join = asg.clone().spawn(token.clone());

        producer.put("s1");
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(join.is_finished());
        let err = join.await.unwrap().unwrap_err();
        assert!(matches!(err, AssignError::OutboundClosed));
        assert_eq!(producer.unfinished(), 0);
        assert!(!token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn new_process_stops_on_cancel() {
        let sched = scheduler(1);
        let (queue, _producer) = WorkQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let asg = Arc::new(Assignator::new(
            sched,
            queue,
            tx,
            KnownItems::new(),
            AssignatorConfig {
                ts: Duration::from_secs(1),
                ..AssignatorConfig::default()
            },
        ));
        let token = CancellationToken::new();
        let join = asg.clone().spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        token.cancel();
        join.await.unwrap().unwrap();
    }
}
