//! # Event subscribers for the slotvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and, with the `logging` feature, the built-in `LogWriter`.
//!
//! ## Architecture
//! ```text
//! RenewingTask / TaskScheduler / Assignator ── publish(Event) ──► Bus
//!                                                                  │
//!                                                  SubscriberSet::listen()
//!                                                  ┌───────┴───────┐
//!                                                  ▼               ▼
//!                                              LogWriter        Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use slotvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct AssignmentAudit;
//!
//! #[async_trait]
//! impl Subscribe for AssignmentAudit {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ItemAssigned {
//!             // write audit record...
//!         }
//!     }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
