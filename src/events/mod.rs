//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `RenewingTask` loops, `TaskScheduler`, `Assignator`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `SubscriberSet::listen` (fans out to subscribers) and
//!   anything holding `bus.subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
