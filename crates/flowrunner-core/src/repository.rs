//! External repository interfaces (§6 of spec.md).
//!
//! Written as native `async fn` in traits returning `impl Future + Send`,
//! matching the teacher's own `WorkflowRepository` trait
//! (`boternity-core/src/repository/workflow.rs`, edition 2024, no
//! `async_trait` macro). Concrete implementations live in
//! `flowrunner-storage`; `flowrunner_core::testutil` provides in-memory
//! doubles for tests.

use std::future::Future;

use flowrunner_schemas::execution::{ExecutionFilter, WorkflowExecution};
use flowrunner_schemas::workflow::{Workflow, WorkflowFilter};
use uuid::Uuid;

use crate::error::EngineError;

/// Read access to workflow definitions, plus the writes the engine itself
/// never performs (definitions are owned by the surrounding application;
/// the engine holds only read references during a run, §3).
pub trait WorkflowRepository: Send + Sync {
    fn create(&self, workflow: &Workflow) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Workflow>, EngineError>> + Send;

    fn update(&self, workflow: &Workflow) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = Result<bool, EngineError>> + Send;

    fn list(
        &self,
        filter: &WorkflowFilter,
    ) -> impl Future<Output = Result<Vec<Workflow>, EngineError>> + Send;

    /// All workflows with `is_active = true` (used by the scheduled-trigger
    /// loop to source candidates, §4.1 item 2).
    fn get_active(&self) -> impl Future<Output = Result<Vec<Workflow>, EngineError>> + Send;

    /// Workflows carrying at least one trigger of the given kind (e.g.
    /// `"schedule"`), per §4.1 item 2.
    fn get_by_trigger(
        &self,
        trigger_type: &str,
    ) -> impl Future<Output = Result<Vec<Workflow>, EngineError>> + Send;
}

/// Create/update/query access to execution records. Execution records are
/// created by the engine on admission and mutated only by their owning
/// executor, or by the engine itself for cancellation-without-executor
/// (§3).
pub trait ExecutionRepository: Send + Sync {
    fn create(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<WorkflowExecution>, EngineError>> + Send;

    fn update(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn list(
        &self,
        filter: &ExecutionFilter,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, EngineError>> + Send;

    fn get_active(
        &self,
        workflow_id: Uuid,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, EngineError>> + Send;

    /// The most recent `limit` executions for a workflow, most recent
    /// first -- the source for `GetWorkflowMetrics` (§4.1, Open Question
    /// (b) in §9 of spec.md).
    fn history(
        &self,
        workflow_id: Uuid,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, EngineError>> + Send;
}
