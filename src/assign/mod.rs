//! Queue-driven placement of work items.
//!
//! ## Contents
//! - [`Assignator`] periodic drain of the inbound queue into free slots
//! - [`AssignatorConfig`], [`Distribution`] cycle interval and filtering
//! - [`WorkQueue`] / [`QueueHandle`] inbound queue with `task_done`/`join`
//! - [`KnownItems`], [`WorkItem`] recognized items and their group codes
//! - [`AssignmentRecord`], [`CycleReport`] outbound records and cycle summaries

mod config;
mod core;
mod known;
mod queue;
mod record;

pub use config::{AssignatorConfig, Distribution};
pub use core::Assignator;
pub use known::{KnownItems, WorkItem};
pub use queue::{QueueHandle, WorkQueue};
pub use record::{AssignmentRecord, CycleReport};
