//! # Slot work: what a slot does with its bound item.
//!
//! A worker runs up to three **legs** per slot, each a renewing loop over a
//! [`SlotWork`] implementation:
//! - [`Leg::Run`] the mandatory per-item processing step;
//! - [`Leg::NetToService`] / [`Leg::ServiceToNet`] optional inbound/outbound legs.
//!
//! [`SlotFn`] wraps a closure, producing a fresh future per call.
//!
//! ## Example
//! ```rust
//! use slotvisor::{SlotContext, SlotFn, SlotStep, SlotWorkRef, TaskError};
//!
//! let work: SlotWorkRef<u64> = SlotFn::arc("poll", |ctx: SlotContext, polls: u64| async move {
//!     let _ = ctx.item; // read from the station...
//!     Ok::<_, TaskError>(SlotStep::Continue(polls + 1))
//! });
//! assert_eq!(work.name(), "poll");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::table::{ItemId, SlotId, WorkerId};
use crate::error::TaskError;
use crate::renew::RenewControl;

/// Which registered work a slot loop drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    /// Mandatory processing step.
    Run,
    /// Optional inbound leg (network → service).
    NetToService,
    /// Optional outbound leg (service → network).
    ServiceToNet,
}

impl Leg {
    pub fn as_str(self) -> &'static str {
        match self {
            Leg::Run => "run",
            Leg::NetToService => "n2s",
            Leg::ServiceToNet => "s2n",
        }
    }
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one call of slot work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStep<S> {
    /// Call again with this state.
    Continue(S),
    /// Stop this slot loop after this call.
    Stop(S),
    /// The item is finished: unbind it, drop it from the worker, keep the loop going.
    Release(S),
}

impl<S> SlotStep<S> {
    pub fn into_state(self) -> S {
        match self {
            SlotStep::Continue(s) | SlotStep::Stop(s) | SlotStep::Release(s) => s,
        }
    }
}

/// What slot work knows about where it runs.
#[derive(Debug, Clone)]
pub struct SlotContext {
    /// Worker identifier (`ipt`).
    pub worker: WorkerId,
    /// Slot identifier (`ico`).
    pub slot: SlotId,
    /// Item bound to the slot.
    pub item: ItemId,
    /// Leg being driven.
    pub leg: Leg,
    /// Control of the loop driving this call.
    pub control: RenewControl,
}

/// Work registered on a [`TaskScheduler`](crate::TaskScheduler).
///
/// `S` is the per-slot state threaded from one call to the next.
#[async_trait]
pub trait SlotWork<S: Send + 'static>: Send + Sync + 'static {
    /// Stable, human-readable name.
    fn name(&self) -> &str;

    /// Maps a newly bound item to the state of its first `run` call.
    ///
    /// The default keeps the slot's current state.
    async fn prepare(&self, item: &str, state: S) -> Result<S, TaskError> {
        let _ = item;
        Ok(state)
    }

    /// Processes the bound item once.
    async fn run(&self, ctx: SlotContext, state: S) -> Result<SlotStep<S>, TaskError>;
}

/// Shared handle to slot work.
pub type SlotWorkRef<S> = Arc<dyn SlotWork<S>>;

/// Closure-backed [`SlotWork`] with the default `prepare`.
pub struct SlotFn<F, S> {
    name: Cow<'static, str>,
    f: F,
    _state: PhantomData<fn(S) -> S>,
}

impl<F, S> SlotFn<F, S> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _state: PhantomData,
        }
    }

    /// Creates the work and returns it as a shared handle.
    pub fn arc<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> SlotWorkRef<S>
    where
        S: Send + 'static,
        F: Fn(SlotContext, S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SlotStep<S>, TaskError>> + Send + 'static,
    {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut, S> SlotWork<S> for SlotFn<F, S>
where
    S: Send + 'static,
    F: Fn(SlotContext, S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SlotStep<S>, TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: SlotContext, state: S) -> Result<SlotStep<S>, TaskError> {
        (self.f)(ctx, state).await
    }
}
