//! End-to-end scenarios against `WorkflowEngine`, using the in-memory test
//! doubles from `flowrunner_core::testutil` (§8 of SPEC_FULL.md: W1-W4,
//! the concurrency-cap scenario, and cancellation).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use flowrunner_core::config::EngineConfigBuilder;
use flowrunner_core::engine::WorkflowEngine;
use flowrunner_core::registry::AgentRegistry;
use flowrunner_core::testutil::{InMemoryEventSink, InMemoryExecutionRepository, InMemoryWorkflowRepository, MockAgentAdapter};
use flowrunner_core::BoxAgentAdapter;
use flowrunner_schemas::event::LifecycleEventKind;
use flowrunner_schemas::execution::{ExecutionFilter, ExecutionStatus, TriggerType};
use flowrunner_schemas::value::ValueMap;
use flowrunner_schemas::workflow::{
    ConditionOperator, ConditionSpec, Connection, ErrorHandling, ErrorHandlingStrategy, StepDefinition,
    StepType, Workflow, WorkflowConfig, WorkflowDefinition,
};
use serde_json::Value;
use uuid::Uuid;

fn step(id: &str, step_type: StepType) -> StepDefinition {
    StepDefinition {
        id: id.to_string(),
        name: id.to_string(),
        step_type,
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

fn workflow(definition: WorkflowDefinition) -> Workflow {
    Workflow {
        workflow_id: Uuid::now_v7(),
        name: "test".to_string(),
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
        definition,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

type TestEngine = WorkflowEngine<InMemoryWorkflowRepository, InMemoryExecutionRepository, InMemoryEventSink>;

fn build_engine(registry: Arc<AgentRegistry>, max_concurrency: usize) -> (Arc<TestEngine>, Arc<InMemoryWorkflowRepository>, Arc<InMemoryEventSink>) {
    let workflow_repo = Arc::new(InMemoryWorkflowRepository::new());
    let execution_repo = Arc::new(InMemoryExecutionRepository::new());
    let event_sink = Arc::new(InMemoryEventSink::new());
    let config = EngineConfigBuilder::new()
        .max_concurrency(max_concurrency)
        .execution_monitor_interval(Duration::from_millis(20))
        .build();
    let engine = WorkflowEngine::new(
        Arc::clone(&workflow_repo),
        execution_repo,
        Arc::clone(&event_sink),
        registry,
        config,
    );
    (engine, workflow_repo, event_sink)
}

async fn wait_for_terminal(engine: &Arc<TestEngine>, execution_id: Uuid) -> flowrunner_schemas::execution::WorkflowExecution {
    for _ in 0..200 {
        let execution = engine.get_execution(execution_id).await.unwrap();
        if execution.status.is_terminal() {
            return execution;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {execution_id} did not terminate in time");
}

#[tokio::test]
async fn w1_single_agent_step_happy_path() {
    let registry = Arc::new(AgentRegistry::new());
    registry
        .register("A", BoxAgentAdapter::new(MockAgentAdapter::new(["echo"])))
        .unwrap();

    let (engine, workflow_repo, event_sink) = build_engine(registry, 10);

    let mut s1 = step("s1", StepType::Agent);
    s1.agent_type = Some("A".to_string());
    s1.action = Some("echo".to_string());

    let mut steps = HashMap::new();
    steps.insert("s1".to_string(), s1);
    let def = WorkflowDefinition {
        start_step: "s1".to_string(),
        steps,
        connections: Vec::new(),
        end_steps: HashSet::from(["s1".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let mut rx = event_sink.subscribe();
    let mut input = ValueMap::new();
    input.insert("x", Value::from(1));

    let execution_id = engine
        .execute(workflow_id, input, TriggerType::Manual, None)
        .await
        .unwrap();

    let execution = wait_for_terminal(&engine, execution_id).await;
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.completed_steps, vec!["s1".to_string()]);

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    assert!(kinds.contains(&LifecycleEventKind::ExecutionStarted));
    assert!(kinds.contains(&LifecycleEventKind::StepStarted));
    assert!(kinds.contains(&LifecycleEventKind::StepCompleted));
    assert!(kinds.contains(&LifecycleEventKind::ExecutionCompleted));
}

#[tokio::test]
async fn w2_condition_branching_selects_matching_connection() {
    let registry = Arc::new(AgentRegistry::new());
    let (engine, workflow_repo, _sink) = build_engine(registry, 10);

    let mut c1 = step("c1", StepType::Condition);
    c1.conditions.push(ConditionSpec {
        name: "eq".to_string(),
        expression: "x".to_string(),
        operator: ConditionOperator::Equals,
        value: Value::from(1),
    });

    let mut t_a = step("tA", StepType::Notification);
    t_a.parameters.insert("message", Value::String("A".to_string()));
    let mut t_b = step("tB", StepType::Notification);
    t_b.parameters.insert("message", Value::String("B".to_string()));

    let mut steps = HashMap::new();
    steps.insert("c1".to_string(), c1);
    steps.insert("tA".to_string(), t_a);
    steps.insert("tB".to_string(), t_b);

    let def = WorkflowDefinition {
        start_step: "c1".to_string(),
        steps,
        connections: vec![
            Connection {
                from_step: "c1".to_string(),
                to_step: "tA".to_string(),
                condition: Some("condition_0".to_string()),
                is_default: false,
            },
            Connection {
                from_step: "c1".to_string(),
                to_step: "tB".to_string(),
                condition: None,
                is_default: true,
            },
        ],
        end_steps: HashSet::from(["tA".to_string(), "tB".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let mut matching_input = ValueMap::new();
    matching_input.insert("x", Value::from(1));
    let execution_id = engine
        .execute(workflow_id, matching_input, TriggerType::Manual, None)
        .await
        .unwrap();
    let execution = wait_for_terminal(&engine, execution_id).await;
    assert!(execution.completed_steps.contains(&"tA".to_string()));

    let mut other_input = ValueMap::new();
    other_input.insert("x", Value::from(2));
    let execution_id = engine
        .execute(workflow_id, other_input, TriggerType::Manual, None)
        .await
        .unwrap();
    let execution = wait_for_terminal(&engine, execution_id).await;
    assert!(execution.completed_steps.contains(&"tB".to_string()));
}

#[tokio::test]
async fn w3_agent_failure_falls_back() {
    let registry = Arc::new(AgentRegistry::new());
    let failing = MockAgentAdapter::new(["go"]);
    failing.push_response(Err(flowrunner_core::agent::AdapterError::RemoteCall("boom".to_string())));
    registry.register("A", BoxAgentAdapter::new(failing)).unwrap();

    let (engine, workflow_repo, _sink) = build_engine(registry, 10);

    let mut s1 = step("s1", StepType::Agent);
    s1.agent_type = Some("A".to_string());
    s1.action = Some("go".to_string());
    s1.error_handling = ErrorHandling {
        strategy: ErrorHandlingStrategy::Fallback,
        continue_on_error: false,
        fallback_step: Some("s2".to_string()),
    };

    let s2 = step("s2", StepType::Notification);

    let mut steps = HashMap::new();
    steps.insert("s1".to_string(), s1);
    steps.insert("s2".to_string(), s2);

    let def = WorkflowDefinition {
        start_step: "s1".to_string(),
        steps,
        connections: Vec::new(),
        end_steps: HashSet::from(["s2".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let execution_id = engine
        .execute(workflow_id, ValueMap::new(), TriggerType::Manual, None)
        .await
        .unwrap();
    let execution = wait_for_terminal(&engine, execution_id).await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.failed_steps.contains("s1"));
    assert!(execution.completed_steps.contains(&"s2".to_string()));
}

#[tokio::test]
async fn w4_workflow_timeout_fails_with_timeout_code() {
    let registry = Arc::new(AgentRegistry::new());
    let (engine, workflow_repo, _sink) = build_engine(registry, 10);

    let mut wait_step = step("s1", StepType::Wait);
    wait_step.parameters.insert("duration", Value::String("500ms".to_string()));

    let mut steps = HashMap::new();
    steps.insert("s1".to_string(), wait_step);
    let def = WorkflowDefinition {
        start_step: "s1".to_string(),
        steps,
        connections: Vec::new(),
        end_steps: HashSet::from(["s1".to_string()]),
    };
    let mut w = workflow(def);
    w.config = Some(WorkflowConfig {
        execution_timeout: Some(Duration::from_millis(50)),
        retry_policy: None,
    });
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let execution_id = engine
        .execute(workflow_id, ValueMap::new(), TriggerType::Manual, None)
        .await
        .unwrap();
    let execution = wait_for_terminal(&engine, execution_id).await;

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error.unwrap().code, flowrunner_schemas::execution::error_codes::EXECUTION_TIMEOUT);
}

#[tokio::test]
async fn concurrency_cap_limits_live_set_and_blocks_admission() {
    let registry = Arc::new(AgentRegistry::new());
    let (engine, workflow_repo, _sink) = build_engine(registry, 2);

    let mut wait_step = step("s1", StepType::Wait);
    wait_step.parameters.insert("duration", Value::String("200ms".to_string()));
    let mut steps = HashMap::new();
    steps.insert("s1".to_string(), wait_step);
    let def = WorkflowDefinition {
        start_step: "s1".to_string(),
        steps,
        connections: Vec::new(),
        end_steps: HashSet::from(["s1".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let started = tokio::time::Instant::now();
    let _e1 = engine.execute(workflow_id, ValueMap::new(), TriggerType::Manual, None).await.unwrap();
    let _e2 = engine.execute(workflow_id, ValueMap::new(), TriggerType::Manual, None).await.unwrap();
    let _e3 = engine.execute(workflow_id, ValueMap::new(), TriggerType::Manual, None).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(150), "third Execute should have blocked on admission, elapsed={elapsed:?}");

    let active = engine
        .list_executions(&ExecutionFilter {
            workflow_ids: vec![workflow_id],
            statuses: vec![ExecutionStatus::Running],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(active.len() <= 2);
}

#[tokio::test]
async fn cancellation_produces_cancelled_terminal_status() {
    let registry = Arc::new(AgentRegistry::new());
    let (engine, workflow_repo, _sink) = build_engine(registry, 10);

    let mut wait_step = step("s1", StepType::Wait);
    wait_step.parameters.insert("duration", Value::String("10s".to_string()));
    let mut steps = HashMap::new();
    steps.insert("s1".to_string(), wait_step);
    let def = WorkflowDefinition {
        start_step: "s1".to_string(),
        steps,
        connections: Vec::new(),
        end_steps: HashSet::from(["s1".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let execution_id = engine
        .execute(workflow_id, ValueMap::new(), TriggerType::Manual, None)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.cancel_execution(execution_id).await.unwrap();

    let execution = wait_for_terminal(&engine, execution_id).await;
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.completed_at.is_some());

    // Double-cancel is idempotent: the already-terminal record is untouched.
    engine.cancel_execution(execution_id).await.unwrap();
    let after = engine.get_execution(execution_id).await.unwrap();
    assert_eq!(after.status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn boundary_start_step_in_end_steps_completes_with_no_step_execution_beyond_start() {
    let registry = Arc::new(AgentRegistry::new());
    let (engine, workflow_repo, _sink) = build_engine(registry, 10);

    let notify = step("s1", StepType::Notification);
    let mut steps = HashMap::new();
    steps.insert("s1".to_string(), notify);
    let def = WorkflowDefinition {
        start_step: "s1".to_string(),
        steps,
        connections: Vec::new(),
        end_steps: HashSet::from(["s1".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let execution_id = engine
        .execute(workflow_id, ValueMap::new(), TriggerType::Manual, None)
        .await
        .unwrap();
    let execution = wait_for_terminal(&engine, execution_id).await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.completed_steps, vec!["s1".to_string()]);
}

#[tokio::test]
async fn boundary_false_condition_with_no_default_terminates_successfully() {
    let registry = Arc::new(AgentRegistry::new());
    let (engine, workflow_repo, _sink) = build_engine(registry, 10);

    let mut c1 = step("c1", StepType::Condition);
    c1.conditions.push(ConditionSpec {
        name: "eq".to_string(),
        expression: "x".to_string(),
        operator: ConditionOperator::Equals,
        value: Value::from(1),
    });
    let t_a = step("tA", StepType::Notification);

    let mut steps = HashMap::new();
    steps.insert("c1".to_string(), c1);
    steps.insert("tA".to_string(), t_a);

    let def = WorkflowDefinition {
        start_step: "c1".to_string(),
        steps,
        connections: vec![Connection {
            from_step: "c1".to_string(),
            to_step: "tA".to_string(),
            condition: Some("condition_0".to_string()),
            is_default: false,
        }],
        end_steps: HashSet::from(["tA".to_string()]),
    };
    let w = workflow(def);
    let workflow_id = w.workflow_id;
    workflow_repo.create(&w).await.unwrap();

    let mut input = ValueMap::new();
    input.insert("x", Value::from(2));
    let execution_id = engine
        .execute(workflow_id, input, TriggerType::Manual, None)
        .await
        .unwrap();
    let execution = wait_for_terminal(&engine, execution_id).await;

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.completed_steps, vec!["c1".to_string()]);
}
