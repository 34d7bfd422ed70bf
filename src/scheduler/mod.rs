//! Slot pools per worker.
//!
//! ## Contents
//! - [`TaskScheduler`] id generation, work registration, slot loops
//! - [`AssignmentTable`] the shared worker → slot → item table
//! - [`SlotWork`] / [`SlotFn`] what a slot does with its item
//! - [`WorkerHandle`] stop/close/join one worker's loops

mod core;
mod ids;
mod table;
mod work;
mod worker;

pub use core::{SlotState, TaskScheduler};
pub use ids::IdRegistry;
pub use table::{
    AssignmentTable, Assignments, ItemId, ItemStatus, SlotEntry, SlotId, SlotMap, TableGuard,
    WorkerId,
};
pub use work::{Leg, SlotContext, SlotFn, SlotStep, SlotWork, SlotWorkRef};
pub use worker::WorkerHandle;
