//! Self-renewing tasks.
//!
//! A [`RenewingTask`] runs its work again and again, feeding each iteration the
//! state returned by the previous one, until it is stopped, closed, or fails.
//! Slot loops and the per-worker reconciliation loop of the
//! [`TaskScheduler`](crate::TaskScheduler) are all renewing tasks.
//!
//! ## Contents
//! - [`RenewingTask`] builder; [`RenewHandle`] returned by `create()`
//! - [`RenewControl`] cloneable stop/pause/resume/close surface
//! - [`Renewal`], [`RenewState`], [`RenewExit`], [`RenewOutcome`]

mod control;
mod state;
mod task;

pub use control::RenewControl;
pub use state::{RenewExit, RenewOutcome, RenewState, Renewal};
pub use task::{RenewHandle, RenewingTask};
