//! Error types used by the slotvisor runtime and slot work.
//!
//! This module defines three error enums:
//!
//! - [`TaskError`]: errors raised by one iteration of user work.
//! - [`SchedulerError`]: errors raised by the slot pool and its assignment table.
//! - [`AssignError`]: errors raised by the assignator cycle.
//!
//! All types provide `as_label` for logging; [`TaskError`] also exposes
//! [`TaskError::is_fatal`].

use thiserror::Error;

/// # Errors produced by slot work.
///
/// Returned from [`SlotWork::run`](crate::SlotWork::run),
/// [`SlotWork::prepare`](crate::SlotWork::prepare) or a renewing closure.
/// Any error ends the renewing loop that observed it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Iteration failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; the host is expected to tear the worker down.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Work observed cancellation and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        TaskError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use slotvisor::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// True for [`TaskError::Fatal`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal { .. })
    }
}

/// # Errors produced by the slot scheduler.
///
/// Identifier collisions never show up here; they are resolved by regeneration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `manage_tasks` was called before any run task was registered.
    #[error("no run task registered")]
    NoRunTask,

    /// `set_new_run_task` was called twice.
    #[error("run task already registered")]
    AlreadyRegistered,

    /// Worker is not present in the assignment table.
    #[error("unknown worker {worker:?}")]
    UnknownWorker {
        /// Worker identifier (`ipt`).
        worker: String,
    },

    /// Worker is already present in the assignment table.
    #[error("worker {worker:?} already managed")]
    WorkerExists {
        /// Worker identifier (`ipt`).
        worker: String,
    },

    /// Slot is not present under the given worker.
    #[error("unknown slot {slot:?} on worker {worker:?}")]
    UnknownSlot {
        /// Worker identifier (`ipt`).
        worker: String,
        /// Slot identifier (`ico`).
        slot: String,
    },

    /// Slot already holds a different item.
    #[error("slot {slot:?} on worker {worker:?} already holds {item:?}")]
    SlotOccupied {
        /// Worker identifier (`ipt`).
        worker: String,
        /// Slot identifier (`ico`).
        slot: String,
        /// Item currently bound to the slot.
        item: String,
    },

    /// Item is already bound to some slot.
    #[error("item {item:?} already assigned to {worker:?}/{slot:?}")]
    AlreadyAssigned {
        /// Item identifier.
        item: String,
        /// Worker currently holding the item.
        worker: String,
        /// Slot currently holding the item.
        slot: String,
    },

    /// Every identifier of the requested length is taken.
    #[error("identifier space of length {length} exhausted")]
    IdSpaceExhausted {
        /// Requested identifier length.
        length: usize,
    },

    /// Slot work failed; the owning loop has terminated.
    #[error("slot {worker}/{slot} failed: {source}")]
    Task {
        /// Worker identifier (`ipt`).
        worker: String,
        /// Slot identifier (`ico`).
        slot: String,
        /// Error returned by the work.
        #[source]
        source: TaskError,
    },

    /// A renewing loop panicked or was aborted by the runtime.
    #[error("slot loop {name} aborted: {reason}")]
    Join {
        /// Loop name.
        name: String,
        /// Panic or abort reason.
        reason: String,
    },
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::NoRunTask => "scheduler_no_run_task",
            SchedulerError::AlreadyRegistered => "scheduler_already_registered",
            SchedulerError::UnknownWorker { .. } => "scheduler_unknown_worker",
            SchedulerError::WorkerExists { .. } => "scheduler_worker_exists",
            SchedulerError::UnknownSlot { .. } => "scheduler_unknown_slot",
            SchedulerError::SlotOccupied { .. } => "scheduler_slot_occupied",
            SchedulerError::AlreadyAssigned { .. } => "scheduler_already_assigned",
            SchedulerError::IdSpaceExhausted { .. } => "scheduler_id_space_exhausted",
            SchedulerError::Task { .. } => "scheduler_task_failed",
            SchedulerError::Join { .. } => "scheduler_join_failed",
        }
    }
}

/// # Errors produced by the assignator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    /// Assignment table rejected a mutation.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Receiver side of the outbound queue was dropped.
    #[error("outbound queue closed")]
    OutboundClosed,
}

impl AssignError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            AssignError::Scheduler(e) => e.as_label(),
            AssignError::OutboundClosed => "assign_outbound_closed",
        }
    }
}
