// Lifecycle events published through the EventSink (§6 of SPEC_FULL.md).
//
// Mirrors the shape the teacher codebase settled on for its own SSE
// events: a flat record with a literal `kind` string, carrying whatever
// correlation ids apply and a free-form data payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::ValueMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    ExecutionStarted,
    ExecutionCompleted,
    StepStarted,
    StepCompleted,
}

impl LifecycleEventKind {
    /// The literal wire string from §6 of SPEC_FULL.md.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEventKind::ExecutionStarted => "execution.started",
            LifecycleEventKind::ExecutionCompleted => "execution.completed",
            LifecycleEventKind::StepStarted => "step.started",
            LifecycleEventKind::StepCompleted => "step.completed",
        }
    }
}

/// Source tag distinguishing who published the event (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    WorkflowEngine,
    WorkflowExecutor,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::WorkflowEngine => "workflow-engine",
            EventSource::WorkflowExecutor => "workflow-executor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub kind: LifecycleEventKind,
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Option<String>,
    pub data: ValueMap,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
}

impl LifecycleEvent {
    pub fn new(
        kind: LifecycleEventKind,
        workflow_id: Uuid,
        execution_id: Uuid,
        source: EventSource,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            workflow_id,
            execution_id,
            step_id: None,
            data: ValueMap::new(),
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_data(mut self, data: ValueMap) -> Self {
        self.data = data;
        self
    }
}
