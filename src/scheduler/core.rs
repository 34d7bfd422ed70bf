//! # TaskScheduler: fixed slot pools driven by renewing loops.
//!
//! For every worker it manages, the scheduler allocates `lnproc` slots and
//! spawns one [`RenewingTask`] per slot per registered leg, plus one
//! reconciliation loop.
//!
//! ## Architecture
//! ```text
//! manage_tasks(worker)
//!   ├─► set_ico() × lnproc ──► table.register_worker(worker, slots)
//!   ├─► per slot:  RenewingTask(process_sta_task)          [Leg::Run]
//!   │              RenewingTask(process_sta_task_n2s)      [Leg::NetToService, optional]
//!   │              RenewingTask(process_sta_task_s2n)      [Leg::ServiceToNet, optional]
//!   └─► RenewingTask(sleep(manager_interval) → process_sta_manager(worker))
//!
//! process_sta_task(state)
//!   ├─ no item bound      ─► sleep(idle_interval), state unchanged
//!   ├─ item pending init  ─► prepare(item) ─► clear init ─► run
//!   └─ item running       ─► run
//!         ├─ Continue(s) ─► next iteration with s
//!         ├─ Stop(s)     ─► loop ends after this iteration
//!         ├─ Release(s)  ─► table.release(item), slot idle again
//!         └─ Err(e)      ─► log + SlotFailed, loop ends with error
//! ```
//!
//! ## Rules
//! - Slot loops never hold the table lock while work runs.
//! - The run leg consumes the pending-init mark; auxiliary legs prepare
//!   whenever the item they last saw changes.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::ids::IdRegistry;
use super::table::{AssignmentTable, ItemId, SlotId, SlotMap, WorkerId};
use super::work::{Leg, SlotContext, SlotStep, SlotWorkRef};
use super::worker::{LoopHandle, WorkerHandle};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::renew::{RenewControl, Renewal, RenewingTask};

/// State threaded through one slot loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotState<S> {
    /// Worker identifier (`ipt`).
    pub worker: WorkerId,
    /// Slot identifier (`ico`).
    pub slot: SlotId,
    /// Item this leg last processed.
    pub item: Option<ItemId>,
    /// Work-defined state.
    pub args: S,
}

impl<S: Default> SlotState<S> {
    pub fn new(worker: impl Into<WorkerId>, slot: impl Into<SlotId>) -> Self {
        Self {
            worker: worker.into(),
            slot: slot.into(),
            item: None,
            args: S::default(),
        }
    }
}

struct Legs<S: Send + 'static> {
    run: SlotWorkRef<S>,
    net2service: Option<SlotWorkRef<S>>,
    service2net: Option<SlotWorkRef<S>>,
}

impl<S: Send + 'static> Legs<S> {
    fn get(&self, leg: Leg) -> Option<&SlotWorkRef<S>> {
        match leg {
            Leg::Run => Some(&self.run),
            Leg::NetToService => self.net2service.as_ref(),
            Leg::ServiceToNet => self.service2net.as_ref(),
        }
    }
}

/// Owns the slot pools of every worker it manages.
pub struct TaskScheduler<S: Send + 'static> {
    cfg: SchedulerConfig,
    table: Arc<AssignmentTable>,
    ipt: Mutex<IdRegistry>,
    ico: Mutex<IdRegistry>,
    legs: OnceLock<Legs<S>>,
    bus: Bus,
}

impl<S> TaskScheduler<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    /// Creates a scheduler with its own event bus.
    pub fn new(cfg: SchedulerConfig) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Self::with_bus(cfg, bus)
    }

    /// Creates a scheduler publishing on an existing bus.
    pub fn with_bus(cfg: SchedulerConfig, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            table: Arc::new(AssignmentTable::new(bus.clone())),
            cfg,
            ipt: Mutex::new(IdRegistry::new()),
            ico: Mutex::new(IdRegistry::new()),
            legs: OnceLock::new(),
            bus,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn table(&self) -> &Arc<AssignmentTable> {
        &self.table
    }

    /// Slots per worker (`lnproc`).
    pub fn lnproc(&self) -> usize {
        self.cfg.slots_per_worker()
    }

    /// Generates a new unique worker identifier.
    pub fn set_ipt(&self, length: usize) -> Result<WorkerId, SchedulerError> {
        self.ipt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate(length)
    }

    /// Generates a new unique slot identifier.
    pub fn set_ico(&self, length: usize) -> Result<SlotId, SchedulerError> {
        self.ico
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate(length)
    }

    /// Registers the work legs. Only the first registration is accepted.
    pub fn set_new_run_task(
        &self,
        run: SlotWorkRef<S>,
        net2service: Option<SlotWorkRef<S>>,
        service2net: Option<SlotWorkRef<S>>,
    ) -> Result<(), SchedulerError> {
        let name = run.name().to_string();
        let legs = Legs {
            run,
            net2service,
            service2net,
        };
        if self.legs.set(legs).is_err() {
            tracing::warn!(run = %name, "run task already registered; registration rejected");
            self.bus.publish(
                Event::new(EventKind::RegistrationRejected)
                    .with_reason(format!("run task {name:?} rejected: already registered")),
            );
            return Err(SchedulerError::AlreadyRegistered);
        }
        tracing::debug!(run = %name, "run task registered");
        Ok(())
    }

    /// True once [`set_new_run_task`](Self::set_new_run_task) succeeded.
    pub fn is_registered(&self) -> bool {
        self.legs.get().is_some()
    }

    fn legs(&self) -> Result<&Legs<S>, SchedulerError> {
        self.legs.get().ok_or(SchedulerError::NoRunTask)
    }

    /// Appends `item` to `worker`'s task list; returns the worker's slot map.
    pub async fn add_task(&self, item: &str, worker: &str) -> Result<SlotMap, SchedulerError> {
        self.table.lock().await.add_task(item, worker)
    }

    /// Marks `item` as bound-but-not-prepared.
    pub async fn set_init(&self, item: &str) {
        self.table.lock().await.set_init(item);
    }

    /// Binds `item` to `(worker, slot)`.
    pub async fn add_sta_assigned(
        &self,
        worker: &str,
        slot: &str,
        item: &str,
    ) -> Result<(), SchedulerError> {
        self.table.lock().await.add_sta_assigned(worker, slot, item)
    }

    /// Empties `(worker, slot)`; returns the item it held.
    pub async fn unset_sta_assigned(
        &self,
        worker: &str,
        slot: &str,
    ) -> Result<Option<ItemId>, SchedulerError> {
        self.table.lock().await.unset_sta_assigned(worker, slot)
    }

    /// Drops `item` from the table entirely.
    pub async fn release(&self, item: &str) -> Option<(WorkerId, SlotId)> {
        self.table.lock().await.release(item)
    }

    /// Binds every unplaced item of `worker`'s task list to a free slot.
    ///
    /// Returns the number of items bound.
    pub async fn process_sta_manager(&self, worker: &str) -> Result<usize, SchedulerError> {
        let mut table = self.table.lock().await;
        let mut bound = 0;
        for item in table.unplaced(worker)? {
            let Some(slot) = table.free_slot(worker)? else {
                break;
            };
            table.set_init(&item);
            table.add_sta_assigned(worker, &slot, &item)?;
            bound += 1;
        }
        if bound > 0 {
            tracing::debug!(worker, bound, "reconciled unplaced items");
        }
        Ok(bound)
    }

    /// One step of the run leg.
    pub async fn process_sta_task(
        &self,
        state: SlotState<S>,
        control: &RenewControl,
    ) -> Result<Renewal<SlotState<S>>, SchedulerError> {
        self.process_leg(Leg::Run, state, control).await
    }

    /// One step of the network → service leg.
    pub async fn process_sta_task_n2s(
        &self,
        state: SlotState<S>,
        control: &RenewControl,
    ) -> Result<Renewal<SlotState<S>>, SchedulerError> {
        self.process_leg(Leg::NetToService, state, control).await
    }

    /// One step of the service → network leg.
    pub async fn process_sta_task_s2n(
        &self,
        state: SlotState<S>,
        control: &RenewControl,
    ) -> Result<Renewal<SlotState<S>>, SchedulerError> {
        self.process_leg(Leg::ServiceToNet, state, control).await
    }

    async fn process_leg(
        &self,
        leg: Leg,
        mut state: SlotState<S>,
        control: &RenewControl,
    ) -> Result<Renewal<SlotState<S>>, SchedulerError> {
        let work = self
            .legs()?
            .get(leg)
            .cloned()
            .ok_or(SchedulerError::NoRunTask)?;

        let (bound, pending_init) = {
            let table = self.table.read().await;
            let bound = table.item_at(&state.worker, &state.slot)?;
            let pending = bound
                .as_deref()
                .is_some_and(|item| table.is_pending_init(item));
            (bound, pending)
        };

        let Some(item) = bound else {
            state.item = None;
            tokio::time::sleep(self.cfg.idle_interval).await;
            return Ok(Renewal::Continue(state));
        };

        let needs_prepare = match leg {
            Leg::Run => pending_init || state.item.as_deref() != Some(item.as_str()),
            Leg::NetToService | Leg::ServiceToNet => {
                state.item.as_deref() != Some(item.as_str())
            }
        };

        if needs_prepare {
            state.args = work
                .prepare(&item, state.args)
                .await
                .map_err(|e| self.slot_failed(&state.worker, &state.slot, &item, leg, e))?;
            if leg == Leg::Run {
                self.table.lock().await.clear_init(&item);
            }
            state.item = Some(item.clone());
        }

        let ctx = SlotContext {
            worker: state.worker.clone(),
            slot: state.slot.clone(),
            item: item.clone(),
            leg,
            control: control.clone(),
        };
        let step = work
            .run(ctx, state.args)
            .await
            .map_err(|e| self.slot_failed(&state.worker, &state.slot, &item, leg, e))?;

        Ok(match step {
            SlotStep::Continue(args) => Renewal::Continue(SlotState { args, ..state }),
            SlotStep::Stop(args) => Renewal::Stop(SlotState { args, ..state }),
            SlotStep::Release(args) => {
                self.release(&item).await;
                tracing::info!(worker = %state.worker, slot = %state.slot, item = %item, "item released by work");
                Renewal::Continue(SlotState {
                    args,
                    item: None,
                    ..state
                })
            }
        })
    }

    fn slot_failed(
        &self,
        worker: &str,
        slot: &str,
        item: &str,
        leg: Leg,
        source: TaskError,
    ) -> SchedulerError {
        tracing::error!(worker, slot, item, leg = %leg, error = %source, "slot work failed");
        self.bus.publish(
            Event::new(EventKind::SlotFailed)
                .with_worker(worker)
                .with_slot(slot)
                .with_item(item)
                .with_reason(source.to_string()),
        );
        SchedulerError::Task {
            worker: worker.to_string(),
            slot: slot.to_string(),
            source,
        }
    }

    /// Allocates a fresh worker identifier and manages it.
    pub async fn spawn_worker(self: &Arc<Self>) -> Result<WorkerHandle, SchedulerError> {
        let worker = self.set_ipt(self.cfg.worker_id_len())?;
        let managed = self.manage_tasks(&worker).await;
        if managed.is_err() {
            self.ipt
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .forget(&worker);
        }
        managed
    }

    /// Registers `worker` with `lnproc` fresh slots and spawns its loops.
    pub async fn manage_tasks(
        self: &Arc<Self>,
        worker: &str,
    ) -> Result<WorkerHandle, SchedulerError> {
        let legs = self.legs()?;
        let active: Vec<Leg> = [Leg::Run, Leg::NetToService, Leg::ServiceToNet]
            .into_iter()
            .filter(|leg| legs.get(*leg).is_some())
            .collect();

        let slots = (0..self.lnproc())
            .map(|_| self.set_ico(self.cfg.slot_id_len()))
            .collect::<Result<Vec<_>, _>>()?;
        let registered = self
            .table
            .lock()
            .await
            .register_worker(worker, slots.clone());
        if let Err(e) = registered {
            let mut ico = self.ico.lock().unwrap_or_else(PoisonError::into_inner);
            for slot in &slots {
                ico.forget(slot);
            }
            return Err(e);
        }

        let token = CancellationToken::new();
        let mut loops = Vec::with_capacity(slots.len() * active.len() + 1);

        for slot in &slots {
            for leg in &active {
                loops.push(self.spawn_slot_loop(*leg, worker, slot, &token));
            }
        }
        loops.push(self.spawn_manager_loop(worker, &token));

        self.bus
            .publish(Event::new(EventKind::WorkerStarted).with_worker(worker));
        tracing::info!(worker, slots = slots.len(), legs = active.len(), "worker started");

        let cleanup = {
            let me = Arc::clone(self);
            let worker = worker.to_string();
            async move { me.retire_worker(&worker).await }.boxed()
        };
        Ok(WorkerHandle::new(worker.to_string(), slots, loops, token, cleanup))
    }

    fn spawn_slot_loop(
        self: &Arc<Self>,
        leg: Leg,
        worker: &str,
        slot: &str,
        token: &CancellationToken,
    ) -> LoopHandle {
        let me = Arc::clone(self);
        let handle = RenewingTask::with_control(
            format!("{worker}/{slot}/{leg}"),
            SlotState::<S>::new(worker, slot),
            move |control: RenewControl, state: SlotState<S>| {
                let me = Arc::clone(&me);
                async move {
                    me.process_leg(leg, state, &control)
                        .await
                        .map_err(into_task_error)
                }
            },
        )
        .with_pause_interval(self.cfg.pause_interval)
        .with_bus(self.bus.clone())
        .with_parent(token)
        .create();

        LoopHandle::new(
            Some(slot.to_string()),
            Some(leg),
            handle.control(),
            async move { handle.join().await.map(|_| ()) }.boxed(),
        )
    }

    fn spawn_manager_loop(self: &Arc<Self>, worker: &str, token: &CancellationToken) -> LoopHandle {
        let me = Arc::clone(self);
        let worker_id = worker.to_string();
        let period = self.cfg.manager_period();

        let handle = RenewingTask::new(format!("{worker}/manager"), (), move |()| {
            let me = Arc::clone(&me);
            let worker = worker_id.clone();
            async move {
                tokio::time::sleep(period).await;
                match me.process_sta_manager(&worker).await {
                    Ok(_) => Ok(Renewal::Continue(())),
                    // Retired from the table: nothing left to reconcile.
                    Err(SchedulerError::UnknownWorker { .. }) => Ok(Renewal::Stop(())),
                    Err(e) => Err(into_task_error(e)),
                }
            }
        })
        .with_pause_interval(self.cfg.pause_interval)
        .with_bus(self.bus.clone())
        .with_parent(token)
        .create();

        LoopHandle::new(
            None,
            None,
            handle.control(),
            async move { handle.join().await.map(|_| ()) }.boxed(),
        )
    }

    /// Drops a worker from the table and returns its identifiers to the pools.
    async fn retire_worker(&self, worker: &str) {
        let removed = self.table.lock().await.remove_worker(worker);
        if let Some(slots) = removed {
            let mut ico = self.ico.lock().unwrap_or_else(PoisonError::into_inner);
            for slot in &slots {
                ico.forget(slot);
            }
            drop(ico);
            self.ipt
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .forget(worker);
            tracing::info!(worker, "worker retired");
        }
    }
}

fn into_task_error(e: SchedulerError) -> TaskError {
    match e {
        SchedulerError::Task { source, .. } => source,
        other => TaskError::fatal(other.to_string()),
    }
}
