//! # slotvisor
//!
//! **Slotvisor** multiplexes a fixed pool of slots per worker across work
//! items that arrive at runtime.
//!
//! Every slot is driven by a self-renewing loop that keeps calling the
//! registered work with the state it returned last. A periodic assignator
//! drains an inbound queue and binds each recognized item to the first
//! worker with a free slot.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   producer ── put(id) ──► WorkQueue
//!                              │  (every ts)
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Assignator                                                       │
//! │  - KnownItems (recognized ids + group codes)                      │
//! │  - Distribution::{All, Group}                                     │
//! │  - first-fit worker ─► add_task → set_init → add_sta_assigned     │
//! └──────┬───────────────────────────────────────────────┬────────────┘
//!        │ TableGuard (write lock)                       │ AssignmentRecord
//!        ▼                                               ▼
//! ┌──────────────────────────────┐              outbound mpsc channel
//! │  AssignmentTable             │
//! │  worker → [slot → item]      │
//! └──────┬───────────────────────┘
//!        │ read() snapshots
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  TaskScheduler                                                    │
//! │  per worker (manage_tasks):                                       │
//! │    lnproc × RenewingTask(process_sta_task)   [+ n2s / s2n legs]   │
//! │    1 × RenewingTask(process_sta_manager)                          │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ SlotWork::prepare / SlotWork::run
//!        ▼
//!   user work
//! ```
//!
//! ### Renewal
//! ```text
//! loop {
//!   ├─ Running   ─► work(state) ─► Continue(s) | Stop(s) | Err(e)
//!   ├─ Paused    ─► pause(state), sleep(pause_interval)
//!   ├─ Stopped   ─► exit with last state
//!   └─ Cancelled ─► exit with last completed state
//! }
//! ```
//!
//! Every component publishes [`Event`]s on a shared [`Bus`]; a
//! [`SubscriberSet`] fans them out to [`Subscribe`] implementations.
//!
//! ## Features
//! | Area              | Description                                                | Key types / traits                           |
//! |-------------------|------------------------------------------------------------|----------------------------------------------|
//! | **Renewal**       | Loops that re-run work with the state it returned.         | [`RenewingTask`], [`RenewHandle`]            |
//! | **Slots**         | Fixed slot pools per worker, shared assignment table.      | [`TaskScheduler`], [`SlotWork`], [`SlotFn`]  |
//! | **Assignment**    | Queue-driven first-fit placement, group filtering.         | [`Assignator`], [`WorkQueue`]                |
//! | **Subscriber API**| Hook into lifecycle events.                                | [`Subscribe`], [`SubscriberSet`]             |
//! | **Errors**        | Typed errors for work, scheduling and assignment.          | [`TaskError`], [`SchedulerError`]            |
//! | **Configuration** | Centralized settings.                                      | [`SchedulerConfig`], [`AssignatorConfig`]    |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in `LogWriter` subscriber _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use slotvisor::{SchedulerConfig, SlotContext, SlotFn, SlotStep, TaskError, TaskScheduler};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sched = TaskScheduler::<u64>::new(SchedulerConfig {
//!         lnproc: 2,
//!         idle_interval: Duration::from_millis(5),
//!         ..SchedulerConfig::default()
//!     });
//!
//!     sched.set_new_run_task(
//!         SlotFn::arc("poll", |ctx: SlotContext, polls: u64| async move {
//!             if ctx.control.iterations() > 100 {
//!                 return Ok::<_, TaskError>(SlotStep::Stop(polls));
//!             }
//!             Ok(SlotStep::Continue(polls + 1))
//!         }),
//!         None,
//!         None,
//!     )?;
//!
//!     let worker = sched.spawn_worker().await?;
//!     let slot = worker.slots()[0].clone();
//!     sched.add_task("ST01", worker.worker()).await?;
//!     sched.set_init("ST01").await;
//!     sched.add_sta_assigned(worker.worker(), &slot, "ST01").await?;
//!
//!     tokio::time::sleep(Duration::from_millis(20)).await;
//!     worker.close();
//!     worker.join().await?;
//!     Ok(())
//! }
//! ```
mod assign;
mod config;
mod error;
mod events;
mod renew;
mod scheduler;
mod subscribers;

// ---- Public re-exports ----

pub use assign::{
    AssignatorConfig, Assignator, AssignmentRecord, CycleReport, Distribution, KnownItems,
    QueueHandle, WorkItem, WorkQueue,
};
pub use config::{DEFAULT_PAUSE_INTERVAL, SchedulerConfig};
pub use error::{AssignError, SchedulerError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use renew::{RenewControl, RenewExit, RenewHandle, RenewOutcome, RenewState, Renewal, RenewingTask};
pub use scheduler::{
    AssignmentTable, Assignments, IdRegistry, ItemId, ItemStatus, Leg, SlotContext, SlotEntry,
    SlotFn, SlotId, SlotMap, SlotState, SlotStep, SlotWork, SlotWorkRef, TableGuard, TaskScheduler,
    WorkerHandle, WorkerId,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
