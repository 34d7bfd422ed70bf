//! # Scheduler configuration.
//!
//! Provides [`SchedulerConfig`], centralized settings for a slot pool.
//!
//! ## Sentinel values
//! - `lnproc = 0` → clamped to 1 (a worker always owns at least one slot)
//! - `ipt_len = 0` / `ico_len = 0` → clamped to 1
//! - `idle_interval = 0s` → idle slots only yield to the runtime between checks
//! - `manager_interval = 0s` → clamped to 1ms
//! - `bus_capacity = 0` → clamped to 1 by [`Bus`](crate::Bus)

use std::time::Duration;

/// Default interval of the no-op pause step (100ms).
pub const DEFAULT_PAUSE_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration of a [`TaskScheduler`](crate::TaskScheduler).
///
/// ## Field semantics
/// - `lnproc`: slots allocated per worker (the concurrency limit of a worker)
/// - `ipt_len`: length of generated worker identifiers
/// - `ico_len`: length of generated slot identifiers
/// - `idle_interval`: sleep of a slot step that found no bound item
/// - `manager_interval`: period of the reconciliation loop (`process_sta_manager`)
/// - `pause_interval`: sleep of the pause step of every renewing loop
/// - `bus_capacity`: event bus ring buffer size
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of slots per worker.
    pub lnproc: usize,

    /// Length of worker identifiers (`ipt`).
    pub ipt_len: usize,

    /// Length of slot identifiers (`ico`).
    pub ico_len: usize,

    /// How long an idle slot waits before looking at the table again.
    ///
    /// Idle slots still renew; this keeps them from spinning.
    pub idle_interval: Duration,

    /// Period of the per-worker reconciliation loop.
    pub manager_interval: Duration,

    /// Interval of the pause step used while a loop is paused.
    pub pause_interval: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
}

impl SchedulerConfig {
    /// Returns `lnproc` clamped to a minimum of 1.
    #[inline]
    pub fn slots_per_worker(&self) -> usize {
        self.lnproc.max(1)
    }

    /// Returns the worker identifier length clamped to a minimum of 1.
    #[inline]
    pub fn worker_id_len(&self) -> usize {
        self.ipt_len.max(1)
    }

    /// Returns the slot identifier length clamped to a minimum of 1.
    #[inline]
    pub fn slot_id_len(&self) -> usize {
        self.ico_len.max(1)
    }

    /// Returns the reconciliation period clamped to a minimum of 1ms.
    #[inline]
    pub fn manager_period(&self) -> Duration {
        self.manager_interval.max(Duration::from_millis(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SchedulerConfig {
    /// Default configuration:
    ///
    /// - `lnproc = 4`
    /// - `ipt_len = 6`, `ico_len = 6`
    /// - `idle_interval = 100ms`
    /// - `manager_interval = 1s`
    /// - `pause_interval = 100ms`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            lnproc: 4,
            ipt_len: 6,
            ico_len: 6,
            idle_interval: Duration::from_millis(100),
            manager_interval: Duration::from_secs(1),
            pause_interval: DEFAULT_PAUSE_INTERVAL,
            bus_capacity: 1024,
        }
    }
}
