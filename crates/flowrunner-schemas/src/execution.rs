// Execution records (§3 of SPEC_FULL.md).

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::ValueMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses per the glossary: after which a record is
    /// immutable.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Event,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Manual => write!(f, "manual"),
            TriggerType::Schedule => write!(f, "schedule"),
            TriggerType::Event => write!(f, "event"),
        }
    }
}

/// Structured error attached to a terminal execution record (§3, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Error codes this engine publishes on execution records (§6).
pub mod error_codes {
    pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
    pub const EXECUTION_TIMEOUT: &str = "EXECUTION_TIMEOUT";
    pub const STEP_EXECUTION_FAILED: &str = "STEP_EXECUTION_FAILED";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub trigger_type: TriggerType,
    pub created_by: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub current_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub failed_steps: HashSet<String>,
    pub input: ValueMap,
    pub variables: ValueMap,
    pub step_results: std::collections::HashMap<String, ValueMap>,
    pub error: Option<ExecutionError>,
}

impl WorkflowExecution {
    pub fn new(
        workflow_id: Uuid,
        trigger_type: TriggerType,
        created_by: Option<String>,
        variables: ValueMap,
        input: ValueMap,
    ) -> Self {
        Self {
            execution_id: Uuid::now_v7(),
            workflow_id,
            trigger_type,
            created_by,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            current_step: None,
            completed_steps: Vec::new(),
            failed_steps: HashSet::new(),
            input,
            variables,
            step_results: std::collections::HashMap::new(),
            error: None,
        }
    }

    /// Transition to a terminal status, stamping `completed_at` and
    /// `duration` (invariant: `completed_at` is set iff status is
    /// terminal, §8).
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<ExecutionError>) {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration = Some(
            (now - self.started_at)
                .to_std()
                .unwrap_or(Duration::ZERO),
        );
        self.error = error;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_definition_id: String,
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub input: ValueMap,
    pub output: Option<ValueMap>,
    pub error: Option<ExecutionError>,
}

impl StepExecutionRecord {
    pub fn start(execution_id: Uuid, step_definition_id: &str, name: &str, input: ValueMap) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            step_definition_id: step_definition_id.to_string(),
            name: name.to_string(),
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            input,
            output: None,
            error: None,
        }
    }

    pub fn finish(&mut self, status: StepStatus, output: Option<ValueMap>, error: Option<ExecutionError>) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration = Some(
            (now - self.started_at)
                .to_std()
                .unwrap_or(Duration::ZERO),
        );
        self.output = output;
        self.error = error;
    }
}

/// Filter shape for `ExecutionRepository::List` (§6).
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub workflow_ids: Vec<Uuid>,
    pub statuses: Vec<ExecutionStatus>,
    pub created_by: Option<String>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_sets_completed_at_and_duration() {
        let mut exec = WorkflowExecution::new(
            Uuid::now_v7(),
            TriggerType::Manual,
            None,
            ValueMap::new(),
            ValueMap::new(),
        );
        assert!(exec.completed_at.is_none());

        exec.finish(ExecutionStatus::Completed, None);
        assert!(exec.completed_at.is_some());
        assert!(exec.duration.is_some());
        assert!(exec.status.is_terminal());
    }
}
