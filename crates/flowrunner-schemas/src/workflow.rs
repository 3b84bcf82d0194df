// Workflow definition model (§3 of SPEC_FULL.md).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SchemaError, SchemaResult};
use crate::value::ValueMap;

/// A workflow definition: the static graph of steps a run walks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub workflow_type: Option<String>,
    pub is_active: bool,
    pub is_archived: bool,
    pub is_template: bool,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
    pub config: Option<WorkflowConfig>,
    pub triggers: Vec<Trigger>,
    pub variables: ValueMap,
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// A workflow is executable iff active and not archived (§3).
    pub fn is_executable(&self) -> bool {
        self.is_active && !self.is_archived
    }

    /// Validate the structural invariants: `start_step` exists, and every
    /// connection references existing steps (§3).
    pub fn validate(&self) -> SchemaResult<()> {
        self.definition.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub execution_timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub start_step: String,
    pub steps: HashMap<String, StepDefinition>,
    pub connections: Vec<Connection>,
    pub end_steps: HashSet<String>,
}

impl WorkflowDefinition {
    pub fn validate(&self) -> SchemaResult<()> {
        if !self.steps.contains_key(&self.start_step) {
            return Err(SchemaError::StartStepMissing(self.start_step.clone()));
        }
        for conn in &self.connections {
            if !self.steps.contains_key(&conn.from_step) {
                return Err(SchemaError::DanglingConnection(conn.from_step.clone()));
            }
            if !self.steps.contains_key(&conn.to_step) {
                return Err(SchemaError::DanglingConnection(conn.to_step.clone()));
            }
        }
        Ok(())
    }

    /// Connections leaving `step_id`, in declaration order — next-step
    /// selection scans these in order (§4.2 step 9).
    pub fn outgoing(&self, step_id: &str) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.from_step == step_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from_step: String,
    pub to_step: String,
    pub condition: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    pub name: String,
    pub step_type: StepType,
    pub agent_type: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: ValueMap,
    #[serde(default)]
    pub input_mapping: HashMap<String, String>,
    #[serde(default)]
    pub output_mapping: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    /// Only meaningful for `StepType::Condition` steps: named boolean
    /// expressions, each a (`expression`, `operator`, `value`) triple
    /// evaluated by the condition evaluator (§4.4, C3).
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Agent,
    Condition,
    Wait,
    Transform,
    Validation,
    Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub name: String,
    pub expression: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandling {
    pub strategy: ErrorHandlingStrategy,
    #[serde(default)]
    pub continue_on_error: bool,
    pub fallback_step: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingStrategy {
    #[default]
    Fail,
    Continue,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub kind: TriggerKind,
    pub is_active: bool,
    pub last_triggered: Option<DateTime<Utc>>,
    pub trigger_count: u64,
    pub schedule_spec: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Schedule,
    Event,
}

/// Filter shape for `WorkflowRepository::List` (§6).
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub status: Option<String>,
    pub workflow_type: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub is_template: Option<bool>,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            name: id.to_string(),
            step_type: StepType::Notification,
            agent_type: None,
            action: None,
            parameters: ValueMap::new(),
            input_mapping: HashMap::new(),
            output_mapping: HashMap::new(),
            timeout: None,
            retry_policy: None,
            error_handling: ErrorHandling::default(),
            conditions: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn validate_rejects_missing_start_step() {
        let def = WorkflowDefinition {
            start_step: "missing".to_string(),
            steps: HashMap::new(),
            connections: Vec::new(),
            end_steps: HashSet::new(),
        };
        assert!(matches!(
            def.validate(),
            Err(SchemaError::StartStepMissing(_))
        ));
    }

    #[test]
    fn validate_rejects_dangling_connection() {
        let mut steps = HashMap::new();
        steps.insert("s1".to_string(), step("s1"));
        let def = WorkflowDefinition {
            start_step: "s1".to_string(),
            steps,
            connections: vec![Connection {
                from_step: "s1".to_string(),
                to_step: "ghost".to_string(),
                condition: None,
                is_default: true,
            }],
            end_steps: HashSet::new(),
        };
        assert!(matches!(
            def.validate(),
            Err(SchemaError::DanglingConnection(_))
        ));
    }
}
