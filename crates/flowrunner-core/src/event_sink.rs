//! External event sink interface (§6 of spec.md, C7).
//!
//! Lifecycle events fan out through this trait to whatever external bus
//! the embedding application wires up. `flowrunner_core::testutil` provides
//! a broadcast-channel-backed in-memory sink grounded directly on the
//! teacher's own `EventBus` (`boternity-core/src/event/bus.rs`);
//! `flowrunner-storage` provides one that also persists events.

use std::future::Future;

use flowrunner_schemas::event::LifecycleEvent;

use crate::error::EngineError;

/// Publishes workflow/execution/step lifecycle events.
///
/// §7: "Event-publish errors are always log-only" -- callers are expected
/// to log and continue on `Err`, never fail the run because a publish
/// failed. The trait still returns a `Result` so an implementation *can*
/// report failure; it is the caller's job not to propagate it into run
/// failure.
pub trait EventSink: Send + Sync {
    fn publish_workflow_event(
        &self,
        event: LifecycleEvent,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn publish_execution_event(
        &self,
        event: LifecycleEvent,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn publish_step_event(
        &self,
        event: LifecycleEvent,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;
}
