// Shared data contracts for the workflow orchestration engine.
//
// This crate owns the wire/storage shape of everything the engine reasons
// about: workflow definitions, step definitions, triggers, execution
// records, and agent health snapshots. It has no opinion on how those
// things are persisted, scheduled, or dispatched — that belongs to
// `flowrunner-core`.

pub mod error;
pub mod event;
pub mod execution;
pub mod health;
pub mod value;
pub mod workflow;

pub use error::{SchemaError, SchemaResult};
pub use event::{EventSource, LifecycleEvent, LifecycleEventKind};
pub use execution::{
    ExecutionError, ExecutionFilter, ExecutionStatus, StepExecutionRecord, StepStatus,
    TriggerType, WorkflowExecution,
};
pub use health::{AgentHealthSnapshot, AgentStatus};
pub use value::ValueMap;
pub use workflow::{
    Connection, ErrorHandling, ErrorHandlingStrategy, RetryPolicy, StepDefinition, StepType,
    Trigger, TriggerKind, Workflow, WorkflowConfig, WorkflowFilter,
};
