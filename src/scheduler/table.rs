//! # Assignment table: the authoritative `(worker, slot) → item` map.
//!
//! Shared by the [`TaskScheduler`](crate::TaskScheduler) slot loops, the
//! reconciliation loop and the [`Assignator`](crate::Assignator).
//!
//! ## Architecture
//! ```text
//! AssignmentTable
//!   └─ RwLock<Assignments>
//!        ├─ workers: [WorkerEntry]          (registration order)
//!        │     ├─ slots: [SlotEntry]        (allocation order; item: Option<ItemId>)
//!        │     └─ tasks: [ItemId]           (items handed to this worker)
//!        └─ init: {ItemId}                  (bound but not yet prepared)
//!
//! read()  → RwLockReadGuard<Assignments>    best-effort snapshot, lock-free for writers' purposes
//! lock()  → TableGuard                      the only way to mutate
//! ```
//!
//! ## Invariants (checked on every mutation)
//! - An item is bound to at most one slot in the whole table.
//! - A slot holds at most one item; a worker never holds more items than slots.
//! - An item that is already bound is never bound again.

use std::collections::HashSet;
use std::ops::Deref;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};

/// Worker identifier (`ipt`).
pub type WorkerId = String;
/// Slot identifier (`ico`).
pub type SlotId = String;
/// Work item identifier (e.g. a station code).
pub type ItemId = String;

/// One slot and the item it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub slot: SlotId,
    pub item: Option<ItemId>,
}

/// Snapshot of one worker's slots, in allocation order.
pub type SlotMap = Vec<SlotEntry>;

/// Where an item currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Not bound to any slot.
    Unassigned,
    /// Bound, waiting for the first `prepare`.
    PendingInit,
    /// Bound and prepared.
    Running,
}

#[derive(Debug)]
struct WorkerEntry {
    worker: WorkerId,
    slots: Vec<SlotEntry>,
    tasks: Vec<ItemId>,
}

impl WorkerEntry {
    fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.item.is_some()).count()
    }
}

/// Table contents. Reachable through [`AssignmentTable::read`] or [`TableGuard`].
#[derive(Debug, Default)]
pub struct Assignments {
    workers: Vec<WorkerEntry>,
    init: HashSet<ItemId>,
}

impl Assignments {
    fn worker(&self, worker: &str) -> Result<&WorkerEntry, SchedulerError> {
        self.workers
            .iter()
            .find(|w| w.worker == worker)
            .ok_or_else(|| SchedulerError::UnknownWorker {
                worker: worker.to_string(),
            })
    }

    fn worker_mut(&mut self, worker: &str) -> Result<&mut WorkerEntry, SchedulerError> {
        self.workers
            .iter_mut()
            .find(|w| w.worker == worker)
            .ok_or_else(|| SchedulerError::UnknownWorker {
                worker: worker.to_string(),
            })
    }

    /// Worker identifiers in registration order.
    pub fn workers(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.worker.clone()).collect()
    }

    /// Snapshot of a worker's slots.
    pub fn slot_map(&self, worker: &str) -> Result<SlotMap, SchedulerError> {
        Ok(self.worker(worker)?.slots.clone())
    }

    /// Items handed to a worker, bound or not.
    pub fn tasks(&self, worker: &str) -> Result<Vec<ItemId>, SchedulerError> {
        Ok(self.worker(worker)?.tasks.clone())
    }

    /// Number of slots of `worker` that hold an item.
    pub fn occupied(&self, worker: &str) -> Result<usize, SchedulerError> {
        Ok(self.worker(worker)?.occupied())
    }

    /// Number of slots of `worker`.
    pub fn capacity(&self, worker: &str) -> Result<usize, SchedulerError> {
        Ok(self.worker(worker)?.slots.len())
    }

    /// First worker, in registration order, with `occupied < min(limit, slots)`.
    pub fn first_fit(&self, limit: usize) -> Option<WorkerId> {
        self.workers
            .iter()
            .find(|w| w.occupied() < limit.min(w.slots.len()))
            .map(|w| w.worker.clone())
    }

    /// First empty slot of `worker`, in allocation order.
    pub fn free_slot(&self, worker: &str) -> Result<Option<SlotId>, SchedulerError> {
        Ok(self
            .worker(worker)?
            .slots
            .iter()
            .find(|s| s.item.is_none())
            .map(|s| s.slot.clone()))
    }

    /// Every item currently bound to a slot (the flattened table).
    pub fn assigned_items(&self) -> HashSet<ItemId> {
        self.workers
            .iter()
            .flat_map(|w| w.slots.iter())
            .filter_map(|s| s.item.clone())
            .collect()
    }

    /// Location of a bound item.
    pub fn locate(&self, item: &str) -> Option<(WorkerId, SlotId)> {
        self.workers.iter().find_map(|w| {
            w.slots
                .iter()
                .find(|s| s.item.as_deref() == Some(item))
                .map(|s| (w.worker.clone(), s.slot.clone()))
        })
    }

    /// Item held by a slot.
    pub fn item_at(&self, worker: &str, slot: &str) -> Result<Option<ItemId>, SchedulerError> {
        self.worker(worker)?
            .slots
            .iter()
            .find(|s| s.slot == slot)
            .map(|s| s.item.clone())
            .ok_or_else(|| SchedulerError::UnknownSlot {
                worker: worker.to_string(),
                slot: slot.to_string(),
            })
    }

    /// Items of `worker`'s task list that are not bound anywhere yet.
    pub fn unplaced(&self, worker: &str) -> Result<Vec<ItemId>, SchedulerError> {
        let assigned = self.assigned_items();
        Ok(self
            .worker(worker)?
            .tasks
            .iter()
            .filter(|t| !assigned.contains(*t))
            .cloned()
            .collect())
    }

    /// True if the item still waits for its first `prepare`.
    pub fn is_pending_init(&self, item: &str) -> bool {
        self.init.contains(item)
    }

    pub fn status(&self, item: &str) -> ItemStatus {
        match self.locate(item) {
            None => ItemStatus::Unassigned,
            Some(_) if self.init.contains(item) => ItemStatus::PendingInit,
            Some(_) => ItemStatus::Running,
        }
    }
}

/// Lock-protected assignment table.
#[derive(Debug)]
pub struct AssignmentTable {
    inner: RwLock<Assignments>,
    bus: Bus,
}

impl AssignmentTable {
    pub fn new(bus: Bus) -> Self {
        Self {
            inner: RwLock::new(Assignments::default()),
            bus,
        }
    }

    /// Shared read access (best-effort snapshot).
    pub async fn read(&self) -> RwLockReadGuard<'_, Assignments> {
        self.inner.read().await
    }

    /// Exclusive access; every mutation goes through the returned guard.
    pub async fn lock(&self) -> TableGuard<'_> {
        TableGuard {
            guard: self.inner.write().await,
            bus: &self.bus,
        }
    }

    /// Convenience: flattened set of bound items.
    pub async fn assigned_items(&self) -> HashSet<ItemId> {
        self.read().await.assigned_items()
    }
}

/// Write guard over the table. Holding it is holding the table lock.
pub struct TableGuard<'a> {
    guard: RwLockWriteGuard<'a, Assignments>,
    bus: &'a Bus,
}

impl Deref for TableGuard<'_> {
    type Target = Assignments;

    fn deref(&self) -> &Assignments {
        &self.guard
    }
}

impl TableGuard<'_> {
    /// Adds a worker with the given (empty) slots.
    pub fn register_worker(
        &mut self,
        worker: &str,
        slots: Vec<SlotId>,
    ) -> Result<(), SchedulerError> {
        if self.guard.workers.iter().any(|w| w.worker == worker) {
            return Err(SchedulerError::WorkerExists {
                worker: worker.to_string(),
            });
        }
        self.guard.workers.push(WorkerEntry {
            worker: worker.to_string(),
            slots: slots
                .into_iter()
                .map(|slot| SlotEntry { slot, item: None })
                .collect(),
            tasks: Vec::new(),
        });
        Ok(())
    }

    /// Removes a worker with all its slots and bindings.
    ///
    /// Returns the removed slot identifiers.
    pub fn remove_worker(&mut self, worker: &str) -> Option<Vec<SlotId>> {
        let idx = self.guard.workers.iter().position(|w| w.worker == worker)?;
        let entry = self.guard.workers.remove(idx);
        for item in entry.slots.iter().filter_map(|s| s.item.as_ref()) {
            self.guard.init.remove(item);
        }
        Some(entry.slots.into_iter().map(|s| s.slot).collect())
    }

    /// Appends `item` to the worker's task list (once) and returns its slot map.
    pub fn add_task(&mut self, item: &str, worker: &str) -> Result<SlotMap, SchedulerError> {
        let entry = self.guard.worker_mut(worker)?;
        if !entry.tasks.iter().any(|t| t == item) {
            entry.tasks.push(item.to_string());
        }
        Ok(entry.slots.clone())
    }

    /// Marks `item` as bound-but-not-prepared.
    pub fn set_init(&mut self, item: &str) {
        self.guard.init.insert(item.to_string());
    }

    /// Clears the pending-init mark. Returns `true` if it was set.
    pub fn clear_init(&mut self, item: &str) -> bool {
        self.guard.init.remove(item)
    }

    /// Binds `item` to `(worker, slot)`.
    ///
    /// Binding the same item to the same slot again is a no-op.
    pub fn add_sta_assigned(
        &mut self,
        worker: &str,
        slot: &str,
        item: &str,
    ) -> Result<(), SchedulerError> {
        if let Some((w, s)) = self.guard.locate(item) {
            if w == worker && s == slot {
                return Ok(());
            }
            return Err(SchedulerError::AlreadyAssigned {
                item: item.to_string(),
                worker: w,
                slot: s,
            });
        }

        let entry = self
            .guard
            .worker_mut(worker)?
            .slots
            .iter_mut()
            .find(|s| s.slot == slot)
            .ok_or_else(|| SchedulerError::UnknownSlot {
                worker: worker.to_string(),
                slot: slot.to_string(),
            })?;

        if let Some(current) = &entry.item {
            return Err(SchedulerError::SlotOccupied {
                worker: worker.to_string(),
                slot: slot.to_string(),
                item: current.clone(),
            });
        }
        entry.item = Some(item.to_string());

        self.bus.publish(
            Event::new(EventKind::SlotBound)
                .with_worker(worker)
                .with_slot(slot)
                .with_item(item),
        );
        Ok(())
    }

    /// Empties `(worker, slot)`. Returns the item it held.
    ///
    /// The item stays in the worker's task list, so the reconciliation loop
    /// binds it again to a free slot; use [`release`](Self::release) to drop it.
    pub fn unset_sta_assigned(
        &mut self,
        worker: &str,
        slot: &str,
    ) -> Result<Option<ItemId>, SchedulerError> {
        let entry = self
            .guard
            .worker_mut(worker)?
            .slots
            .iter_mut()
            .find(|s| s.slot == slot)
            .ok_or_else(|| SchedulerError::UnknownSlot {
                worker: worker.to_string(),
                slot: slot.to_string(),
            })?;

        let prev = entry.item.take();
        if let Some(item) = &prev {
            self.guard.init.remove(item);
            self.bus.publish(
                Event::new(EventKind::SlotReleased)
                    .with_worker(worker)
                    .with_slot(slot)
                    .with_item(item.as_str()),
            );
        }
        Ok(prev)
    }

    /// Drops `item` entirely: its slot, its task-list entry and its init mark.
    ///
    /// Returns where it was bound, if anywhere.
    pub fn release(&mut self, item: &str) -> Option<(WorkerId, SlotId)> {
        let location = self.guard.locate(item);
        if let Some((worker, slot)) = &location {
            // Location was just read under the same guard.
            let _ = self.unset_sta_assigned(worker, slot);
        }
        for w in self.guard.workers.iter_mut() {
            w.tasks.retain(|t| t != item);
        }
        self.guard.init.remove(item);
        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_with(workers: &[(&str, &[&str])]) -> AssignmentTable {
        let table = AssignmentTable::new(Bus::new(64));
        {
            let mut g = table.lock().await;
            for (w, slots) in workers {
                g.register_worker(w, slots.iter().map(|s| s.to_string()).collect())
                    .unwrap();
            }
        }
        table
    }

    #[tokio::test]
    async fn item_cannot_be_bound_twice() {
        let table = table_with(&[("w1", &["a", "b"]), ("w2", &["c"])]).await;
        let mut g = table.lock().await;

        g.add_sta_assigned("w1", "a", "ST01").unwrap();
        g.add_sta_assigned("w1", "a", "ST01").unwrap();

        let err = g.add_sta_assigned("w2", "c", "ST01").unwrap_err();
        assert_eq!(
            err,
            SchedulerError::AlreadyAssigned {
                item: "ST01".into(),
                worker: "w1".into(),
                slot: "a".into(),
            }
        );
    }

    #[tokio::test]
    async fn occupied_slot_rejects_another_item() {
        let table = table_with(&[("w1", &["a"])]).await;
        let mut g = table.lock().await;

        g.add_sta_assigned("w1", "a", "ST01").unwrap();
        let err = g.add_sta_assigned("w1", "a", "ST02").unwrap_err();
        assert_eq!(err.as_label(), "scheduler_slot_occupied");
        assert_eq!(g.occupied("w1").unwrap(), 1);
        assert_eq!(g.first_fit(1), None);
    }

    #[tokio::test]
    async fn first_fit_follows_registration_order() {
        let table = table_with(&[("w1", &["a"]), ("w2", &["b", "c"])]).await;
        let mut g = table.lock().await;

        assert_eq!(g.first_fit(2).as_deref(), Some("w1"));
        g.add_sta_assigned("w1", "a", "ST01").unwrap();
        assert_eq!(g.first_fit(2).as_deref(), Some("w2"));
        assert_eq!(g.free_slot("w2").unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn unset_keeps_task_release_drops_it() {
        let table = table_with(&[("w1", &["a", "b"])]).await;
        let mut g = table.lock().await;

        g.add_task("ST01", "w1").unwrap();
        g.set_init("ST01");
        g.add_sta_assigned("w1", "a", "ST01").unwrap();
        assert_eq!(g.status("ST01"), ItemStatus::PendingInit);

        assert_eq!(
            g.unset_sta_assigned("w1", "a").unwrap().as_deref(),
            Some("ST01")
        );
        assert_eq!(g.status("ST01"), ItemStatus::Unassigned);
        assert_eq!(g.unplaced("w1").unwrap(), vec!["ST01".to_string()]);

        g.add_sta_assigned("w1", "b", "ST01").unwrap();
        assert_eq!(g.status("ST01"), ItemStatus::Running);
        assert_eq!(g.release("ST01"), Some(("w1".into(), "b".into())));
        assert!(g.tasks("w1").unwrap().is_empty());
        assert!(g.assigned_items().is_empty());
    }

    #[tokio::test]
    async fn add_task_is_idempotent_and_returns_slot_map() {
        let table = table_with(&[("w1", &["a", "b"])]).await;
        let mut g = table.lock().await;

        let map = g.add_task("ST01", "w1").unwrap();
        g.add_task("ST01", "w1").unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.iter().all(|s| s.item.is_none()));
        assert_eq!(g.tasks("w1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_worker_and_slot_are_errors() {
        let table = table_with(&[("w1", &["a"])]).await;
        let mut g = table.lock().await;

        assert_eq!(
            g.add_task("ST01", "nope").unwrap_err().as_label(),
            "scheduler_unknown_worker"
        );
        assert_eq!(
            g.add_sta_assigned("w1", "zz", "ST01").unwrap_err().as_label(),
            "scheduler_unknown_slot"
        );
        assert!(
            g.register_worker("w1", vec![]).is_err(),
            "duplicate worker must be rejected"
        );
    }
}
