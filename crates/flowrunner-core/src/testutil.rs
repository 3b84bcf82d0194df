//! In-memory test doubles for every external trait (§4.5 "Test tooling" of
//! SPEC_FULL.md). The event sink is grounded directly on the teacher's own
//! `EventBus` (`boternity-core/src/event/bus.rs`): a `tokio::sync::broadcast`
//! channel, fire-and-forget on the publish side.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use flowrunner_schemas::event::LifecycleEvent;
use flowrunner_schemas::execution::{ExecutionFilter, WorkflowExecution};
use flowrunner_schemas::health::AgentStatus;
use flowrunner_schemas::value::ValueMap;
use flowrunner_schemas::workflow::{Workflow, WorkflowFilter};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::agent::{AdapterError, AdapterMetrics, AgentAdapter};
use crate::error::Result;
use crate::event_sink::EventSink;
use crate::repository::{ExecutionRepository, WorkflowRepository};

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, workflow: &Workflow) -> Result<()> {
        self.workflows.write().await.insert(workflow.workflow_id, workflow.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn update(&self, workflow: &Workflow) -> Result<()> {
        self.workflows.write().await.insert(workflow.workflow_id, workflow.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.workflows.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .filter(|w| filter.is_active.is_none_or(|active| w.is_active == active))
            .cloned()
            .collect())
    }

    async fn get_active(&self) -> Result<Vec<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect())
    }

    async fn get_by_trigger(&self, trigger_type: &str) -> Result<Vec<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| {
                w.triggers
                    .iter()
                    .any(|t| format!("{:?}", t.kind).to_lowercase() == trigger_type)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: &WorkflowExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        Ok(executions
            .values()
            .filter(|e| filter.workflow_ids.is_empty() || filter.workflow_ids.contains(&e.workflow_id))
            .filter(|e| filter.statuses.is_empty() || filter.statuses.contains(&e.status))
            .cloned()
            .collect())
    }

    async fn get_active(&self, workflow_id: Uuid) -> Result<Vec<WorkflowExecution>> {
        Ok(self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.workflow_id == workflow_id && !e.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn history(&self, workflow_id: Uuid, limit: u32) -> Result<Vec<WorkflowExecution>> {
        let executions = self.executions.read().await;
        let mut matching: Vec<WorkflowExecution> = executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

/// Broadcast-channel-backed event sink, following the teacher's `EventBus`.
/// Publish is fire-and-forget: a `SendError` (no subscribers) is swallowed,
/// matching §7's "event-publish errors are always log-only".
pub struct InMemoryEventSink {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: LifecycleEvent) -> Result<()> {
        let _ = self.sender.send(event);
        Ok(())
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for InMemoryEventSink {
    async fn publish_workflow_event(&self, event: LifecycleEvent) -> Result<()> {
        self.publish(event)
    }

    async fn publish_execution_event(&self, event: LifecycleEvent) -> Result<()> {
        self.publish(event)
    }

    async fn publish_step_event(&self, event: LifecycleEvent) -> Result<()> {
        self.publish(event)
    }
}

/// A scriptable adapter double: queue up responses for `execute`, fix a
/// `status`/`capabilities`/`validate` behavior up front.
pub struct MockAgentAdapter {
    responses: StdMutex<VecDeque<std::result::Result<ValueMap, AdapterError>>>,
    capabilities: Vec<String>,
    status: AgentStatus,
    reject_validate: Option<Vec<String>>,
}

impl MockAgentAdapter {
    pub fn new(capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: StdMutex::new(VecDeque::new()),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            status: AgentStatus::Online,
            reject_validate: None,
        }
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Make every call to `validate` fail, carrying these missing fields.
    pub fn rejecting_validation(mut self, missing_fields: Vec<String>) -> Self {
        self.reject_validate = Some(missing_fields);
        self
    }

    pub fn push_response(&self, response: std::result::Result<ValueMap, AdapterError>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

impl AgentAdapter for MockAgentAdapter {
    async fn execute(&self, action: &str, input: ValueMap) -> std::result::Result<ValueMap, AdapterError> {
        if !self.capabilities.iter().any(|c| c == action) {
            return Err(AdapterError::UnsupportedAction(action.to_string()));
        }
        let queued = self.responses.lock().unwrap().pop_front();
        queued.unwrap_or(Ok(input))
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn status(&self) -> AgentStatus {
        self.status
    }

    fn validate(&self, _action: &str, _input: &ValueMap) -> std::result::Result<(), AdapterError> {
        match &self.reject_validate {
            Some(missing) => Err(AdapterError::Validation(missing.clone())),
            None => Ok(()),
        }
    }

    async fn metrics(&self) -> AdapterMetrics {
        AdapterMetrics {
            total: 0,
            succeeded: 0,
            failed: 0,
            average_response_time: Duration::ZERO,
            current_load: 0.0,
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrunner_schemas::execution::TriggerType;

    #[tokio::test]
    async fn in_memory_workflow_repository_roundtrips() {
        let repo = InMemoryWorkflowRepository::new();
        let workflow = sample_workflow();
        repo.create(&workflow).await.unwrap();
        let fetched = repo.get(workflow.workflow_id).await.unwrap().unwrap();
        assert_eq!(fetched.name, workflow.name);
    }

    #[tokio::test]
    async fn in_memory_execution_repository_history_is_most_recent_first() {
        let repo = InMemoryExecutionRepository::new();
        let workflow_id = Uuid::now_v7();
        for _ in 0..3 {
            let execution = WorkflowExecution::new(
                workflow_id,
                TriggerType::Manual,
                None,
                ValueMap::new(),
                ValueMap::new(),
            );
            repo.create(&execution).await.unwrap();
        }
        let history = repo.history(workflow_id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn mock_adapter_rejects_unknown_action() {
        let adapter = MockAgentAdapter::new(["greet"]);
        let err = adapter.execute("farewell", ValueMap::new()).await.unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedAction(_)));
    }

    fn sample_workflow() -> Workflow {
        use flowrunner_schemas::workflow::WorkflowDefinition;
        use std::collections::{HashMap as Map, HashSet};

        Workflow {
            workflow_id: Uuid::now_v7(),
            name: "sample".to_string(),
            category: None,
            workflow_type: None,
            is_active: true,
            is_archived: false,
            is_template: false,
            created_by: None,
            tags: Vec::new(),
            config: None,
            triggers: Vec::new(),
            variables: ValueMap::new(),
            definition: WorkflowDefinition {
                start_step: "s1".to_string(),
                steps: Map::new(),
                connections: Vec::new(),
                end_steps: HashSet::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
