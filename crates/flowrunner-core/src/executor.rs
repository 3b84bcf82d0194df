//! Workflow executor (C5, §4.2 of spec.md).
//!
//! Grounded on the *shape* of the teacher's `DagExecutor`
//! (`boternity-core/src/workflow/executor.rs`): constructed with the
//! definition and execution record, registry, repository, and event sink;
//! exposes a run/cancel/timeout surface; wraps step work in
//! `tokio::time::timeout`; publishes lifecycle events around each step.
//! Unlike the teacher, this driver walks `definition.connections`
//! sequentially rather than computing topological waves and running them
//! concurrently -- §4.2 specifies no step-level parallelism, and there is
//! no checkpoint/resume (Non-goal: durable resumption).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flowrunner_schemas::event::{EventSource, LifecycleEvent, LifecycleEventKind};
use flowrunner_schemas::execution::{ExecutionError, ExecutionStatus, WorkflowExecution, error_codes};
use flowrunner_schemas::value::ValueMap;
use flowrunner_schemas::workflow::{ErrorHandlingStrategy, Workflow};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event_sink::EventSink;
use crate::registry::AgentRegistry;
use crate::repository::ExecutionRepository;
use crate::retry;
use crate::step::{self, StepFailure};

/// One live execution's driver. Owned exclusively by the engine's live-set
/// for the duration of `run`; removed on termination (§3).
pub struct WorkflowExecutor<X: ExecutionRepository, EV: EventSink> {
    workflow: Arc<Workflow>,
    execution: WorkflowExecution,
    execution_repo: Arc<X>,
    event_sink: Arc<EV>,
    registry: Arc<AgentRegistry>,
    cancel_token: CancellationToken,
    timed_out: Arc<AtomicBool>,
    deadline: Option<Instant>,
    default_step_timeout: Duration,
}

impl<X: ExecutionRepository, EV: EventSink> WorkflowExecutor<X, EV> {
    pub fn new(
        workflow: Arc<Workflow>,
        execution: WorkflowExecution,
        execution_repo: Arc<X>,
        event_sink: Arc<EV>,
        registry: Arc<AgentRegistry>,
        default_step_timeout: Duration,
    ) -> Self {
        let deadline = workflow
            .config
            .as_ref()
            .and_then(|c| c.execution_timeout)
            .map(|timeout| Instant::now() + timeout);

        Self {
            workflow,
            execution,
            execution_repo,
            event_sink,
            registry,
            cancel_token: CancellationToken::new(),
            timed_out: Arc::new(AtomicBool::new(false)),
            deadline,
            default_step_timeout,
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution.execution_id
    }

    /// A lightweight clone of this executor's control surface, for the
    /// engine's live-set to hold while the executor itself is moved into
    /// its own driving task (§4.1).
    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            execution_id: self.execution.execution_id,
            cancel_token: self.cancel_token.clone(),
            timed_out: Arc::clone(&self.timed_out),
            deadline: self.deadline,
            started_at: self.execution.started_at,
            default_step_timeout: self.default_step_timeout,
        }
    }

    /// Drive the execution to completion. Returns `Ok(())` on any orderly
    /// terminal transition, including a deliberate `cancelled` or `failed`
    /// status; only unexpected infrastructure failures return `Err` (§4.2).
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut current_step = self.workflow.definition.start_step.clone();

        loop {
            if self.cancel_token.is_cancelled() {
                if self.timed_out.load(Ordering::SeqCst) {
                    self.finish(
                        ExecutionStatus::Failed,
                        Some(ExecutionError::new(error_codes::EXECUTION_TIMEOUT, "execution timed out")),
                    )
                    .await;
                } else {
                    self.finish(ExecutionStatus::Cancelled, None).await;
                }
                return Ok(());
            }

            self.execution.current_step = Some(current_step.clone());

            let Some(step_def) = self.workflow.definition.steps.get(&current_step).cloned() else {
                self.finish(
                    ExecutionStatus::Failed,
                    Some(ExecutionError::new(
                        error_codes::EXECUTION_FAILED,
                        format!("STEP_NOT_FOUND: {current_step}"),
                    )),
                )
                .await;
                return Ok(());
            };

            let context = self.execution.variables.clone().merged_with(&step_def.parameters);
            let mapped = context.project(&step_def.input_mapping);
            let input = context.merged_with(&mapped);

            let step_deadline = self.step_deadline(step_def.timeout);

            self.publish_step_event(LifecycleEventKind::StepStarted, &current_step, ValueMap::new())
                .await;

            let outcome = self.run_step_with_retry(&step_def, input, step_deadline).await;

            match outcome {
                Ok(output) => {
                    self.execution.completed_steps.push(current_step.clone());
                    self.execution
                        .step_results
                        .insert(current_step.clone(), output.clone());
                    self.execution.variables = self
                        .execution
                        .variables
                        .clone()
                        .merged_with(&output.project(&step_def.output_mapping));

                    self.publish_step_event(LifecycleEventKind::StepCompleted, &current_step, output.clone())
                        .await;

                    match self.select_next_step(&current_step, &output) {
                        Some(next) if !self.workflow.definition.end_steps.contains(&next) => {
                            current_step = next;
                        }
                        _ => {
                            self.finish(ExecutionStatus::Completed, None).await;
                            return Ok(());
                        }
                    }
                }
                Err(failure) => {
                    // A failure caused by this execution's own deadline or an
                    // external cancel must not fall through to the step's
                    // `error_handling` policy -- it's not the step that
                    // failed, the run was cut short (§4.2 "Timeout",
                    // "Cancellation").
                    if self.timed_out.load(Ordering::SeqCst) || self.workflow_deadline_elapsed() {
                        self.finish(
                            ExecutionStatus::Failed,
                            Some(ExecutionError::new(error_codes::EXECUTION_TIMEOUT, failure.message)),
                        )
                        .await;
                        return Ok(());
                    }
                    if self.cancel_token.is_cancelled() {
                        self.finish(ExecutionStatus::Cancelled, None).await;
                        return Ok(());
                    }
                    match self.handle_step_failure(&current_step, &step_def, failure).await {
                        StepDisposition::Terminate(error) => {
                            self.finish(ExecutionStatus::Failed, Some(error)).await;
                            return Ok(());
                        }
                        StepDisposition::Continue(next) => match next {
                            Some(next) if !self.workflow.definition.end_steps.contains(&next) => {
                                current_step = next;
                            }
                            _ => {
                                self.finish(ExecutionStatus::Completed, None).await;
                                return Ok(());
                            }
                        },
                    }
                }
            }
        }
    }

    /// The derived per-step deadline: `min(remaining workflow deadline,
    /// step.timeout)` (§4.2 step 5).
    fn step_deadline(&self, step_timeout: Option<Duration>) -> Duration {
        let step_timeout = step_timeout.unwrap_or(self.default_step_timeout);
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                remaining.min(step_timeout)
            }
            None => step_timeout,
        }
    }

    /// Whether the workflow's own `execution_timeout` has elapsed, regardless
    /// of whether the engine's external monitor has had a tick to notice it
    /// yet -- the per-step deadline derived from it (`step_deadline` above)
    /// can expire first (§4.2 step 5, "Timeout").
    fn workflow_deadline_elapsed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    async fn run_step_with_retry(
        &self,
        step_def: &flowrunner_schemas::workflow::StepDefinition,
        input: ValueMap,
        deadline: Duration,
    ) -> Result<ValueMap, StepFailure> {
        let mut attempt: u32 = 1;
        loop {
            let attempt_future = tokio::time::timeout(
                deadline,
                step::execute_step(step_def, input.clone(), &self.registry, &self.cancel_token),
            );

            let result = tokio::select! {
                result = attempt_future => result,
                _ = self.cancel_token.cancelled() => {
                    return Err(StepFailure {
                        message: "step cancelled".to_string(),
                        partial_result: None,
                    });
                }
            };

            let failure = match result {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(failure)) => failure,
                Err(_) => StepFailure {
                    message: "step timed out".to_string(),
                    partial_result: None,
                },
            };

            // Retries only cover agent-typed steps, occur inside the step's
            // timeout, and are advisory (§4.2 "Retries").
            let retryable = matches!(step_def.step_type, flowrunner_schemas::workflow::StepType::Agent)
                && step_def
                    .retry_policy
                    .as_ref()
                    .is_some_and(|policy| retry::should_retry(policy, attempt, &failure.message));

            if !retryable {
                return Err(failure);
            }

            let backoff = retry::backoff_for(step_def.retry_policy.as_ref().unwrap(), attempt);
            attempt += 1;

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.cancel_token.cancelled() => {
                    return Err(StepFailure {
                        message: "step cancelled".to_string(),
                        partial_result: None,
                    });
                }
            }
        }
    }

    /// Consult `step.error_handling` for the disposition per §4.2 step 8.
    async fn handle_step_failure(
        &mut self,
        current_step: &str,
        step_def: &flowrunner_schemas::workflow::StepDefinition,
        failure: StepFailure,
    ) -> StepDisposition {
        self.execution.failed_steps.insert(current_step.to_string());

        match step_def.error_handling.strategy {
            ErrorHandlingStrategy::Fail => StepDisposition::Terminate(ExecutionError::new(
                error_codes::STEP_EXECUTION_FAILED,
                failure.message,
            )),
            ErrorHandlingStrategy::Continue if step_def.error_handling.continue_on_error => {
                let mut result = failure.partial_result.unwrap_or_default();
                result.insert("error", serde_json::Value::String(failure.message.clone()));
                self.execution.completed_steps.push(current_step.to_string());
                self.execution.step_results.insert(current_step.to_string(), result.clone());
                self.execution.variables = self.execution.variables.clone().merged_with(&result);
                self.publish_step_event(LifecycleEventKind::StepCompleted, current_step, result.clone())
                    .await;
                StepDisposition::Continue(self.select_next_step(current_step, &result))
            }
            ErrorHandlingStrategy::Fallback => match &step_def.error_handling.fallback_step {
                Some(fallback) => StepDisposition::Continue(Some(fallback.clone())),
                None => StepDisposition::Terminate(ExecutionError::new(
                    error_codes::STEP_EXECUTION_FAILED,
                    failure.message,
                )),
            },
            _ => StepDisposition::Terminate(ExecutionError::new(
                error_codes::STEP_EXECUTION_FAILED,
                failure.message,
            )),
        }
    }

    /// Next-step selection: scan `definition.connections` from the current
    /// step in declaration order; the first connection whose `condition`
    /// evaluates true (or the `is_default` connection when none matches)
    /// provides the next step (§4.2 step 9).
    fn select_next_step(&self, current_step: &str, result: &ValueMap) -> Option<String> {
        let mut default: Option<String> = None;
        for connection in self.workflow.definition.outgoing(current_step) {
            if let Some(condition_key) = &connection.condition {
                if matches!(result.get(condition_key), Some(serde_json::Value::Bool(true))) {
                    return Some(connection.to_step.clone());
                }
            } else if connection.is_default && default.is_none() {
                default = Some(connection.to_step.clone());
            }
        }
        default
    }

    async fn finish(&mut self, status: ExecutionStatus, error: Option<ExecutionError>) {
        self.execution.finish(status, error);
        if let Err(e) = self.execution_repo.update(&self.execution).await {
            tracing::warn!(execution_id = %self.execution.execution_id, error = %e, "persisting terminal execution record failed, retrying once");
            let _ = self.execution_repo.update(&self.execution).await;
        }
        self.publish_execution_event(LifecycleEventKind::ExecutionCompleted).await;
    }

    async fn publish_step_event(&self, kind: LifecycleEventKind, step_id: &str, data: ValueMap) {
        let event = LifecycleEvent::new(
            kind,
            self.workflow.workflow_id,
            self.execution.execution_id,
            EventSource::WorkflowExecutor,
        )
        .with_step(step_id)
        .with_data(data);
        if let Err(e) = self.event_sink.publish_step_event(event).await {
            tracing::warn!(execution_id = %self.execution.execution_id, error = %e, "step event publish failed");
        }
    }

    async fn publish_execution_event(&self, kind: LifecycleEventKind) {
        let mut data = ValueMap::new();
        data.insert("status", serde_json::to_value(self.execution.status).unwrap_or_default());
        let event = LifecycleEvent::new(
            kind,
            self.workflow.workflow_id,
            self.execution.execution_id,
            EventSource::WorkflowExecutor,
        )
        .with_data(data);
        if let Err(e) = self.event_sink.publish_execution_event(event).await {
            tracing::warn!(execution_id = %self.execution.execution_id, error = %e, "execution event publish failed");
        }
    }
}

enum StepDisposition {
    Terminate(ExecutionError),
    Continue(Option<String>),
}

/// Control surface the engine's live-set holds for a running executor,
/// without needing a back-reference into the task driving it.
#[derive(Clone)]
pub struct ExecutorHandle {
    pub execution_id: Uuid,
    cancel_token: CancellationToken,
    timed_out: Arc<AtomicBool>,
    deadline: Option<Instant>,
    started_at: chrono::DateTime<chrono::Utc>,
    default_step_timeout: Duration,
}

impl ExecutorHandle {
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_timed_out(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn is_healthy(&self) -> bool {
        if self.deadline.is_some() {
            return true;
        }
        let running_for = chrono::Utc::now() - self.started_at;
        running_for
            .to_std()
            .map(|elapsed| elapsed < self.default_step_timeout * 4)
            .unwrap_or(true)
    }

    /// Request a terminal `EXECUTION_TIMEOUT` stop at the executor's next
    /// checkpoint (§4.2 "Timeout").
    pub fn timeout(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        self.cancel_token.cancel();
    }
}
