//! Orchestration engine (C6, §4.1 of spec.md).
//!
//! Grounded on the teacher's `DagExecutor` (`boternity-core/src/workflow/executor.rs`)
//! for its admission/live-set/background-monitor shape, collapsed from a
//! per-workflow-name `DashMap<String, Arc<Semaphore>>` down to the single
//! global `Arc<Semaphore>` §4.1 specifies.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use flowrunner_schemas::event::{EventSource, LifecycleEvent, LifecycleEventKind};
use flowrunner_schemas::execution::{ExecutionFilter, TriggerType, WorkflowExecution};
use flowrunner_schemas::value::ValueMap;
use flowrunner_schemas::workflow::TriggerKind;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::executor::{ExecutorHandle, WorkflowExecutor};
use crate::metrics::{self, WorkflowMetrics};
use crate::registry::AgentRegistry;
use crate::repository::{ExecutionRepository, WorkflowRepository};
use crate::schedule::ScheduleSpec;
use crate::event_sink::EventSink;

pub struct WorkflowEngine<R: WorkflowRepository, X: ExecutionRepository, EV: EventSink> {
    workflow_repo: Arc<R>,
    execution_repo: Arc<X>,
    event_sink: Arc<EV>,
    registry: Arc<AgentRegistry>,
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
    live: RwLock<HashMap<Uuid, ExecutorHandle>>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl<R: WorkflowRepository + 'static, X: ExecutionRepository + 'static, EV: EventSink + 'static>
    WorkflowEngine<R, X, EV>
{
    pub fn new(
        workflow_repo: Arc<R>,
        execution_repo: Arc<X>,
        event_sink: Arc<EV>,
        registry: Arc<AgentRegistry>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Arc::new(Self {
            workflow_repo,
            execution_repo,
            event_sink,
            registry,
            config,
            semaphore,
            live: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the two background monitors plus the registry's own health
    /// loop. Idempotent: a second call is a no-op (§4.1).
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.execution_monitor_loop().await });

        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.scheduler_loop().await });

        let registry = Arc::clone(&self.registry);
        let cancel = self.shutdown.clone();
        let interval = self.config.execution_monitor_interval;
        tokio::spawn(async move { registry.monitor_health(interval, cancel).await });
    }

    /// Signal every background task to stop, then wait up to `timeout` for
    /// the live-set to drain. Returns once it is empty or the deadline
    /// passes, whichever is first -- a timeout here is logged, not an error
    /// (§9 supplemented behavior).
    pub async fn stop(self: &Arc<Self>, timeout: Duration) {
        self.shutdown.cancel();
        for handle in self.live.read().await.values() {
            handle.cancel();
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.live.read().await.is_empty() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                let remaining = self.live.read().await.len();
                tracing::warn!(remaining, "stop timed out waiting for live executions to drain");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Admit and start one execution. Returns the new execution id once a
    /// concurrency slot has been acquired and the execution record
    /// persisted; the run itself proceeds on a spawned task (§4.1).
    pub async fn execute(
        self: &Arc<Self>,
        workflow_id: Uuid,
        input: ValueMap,
        trigger_type: TriggerType,
        created_by: Option<String>,
    ) -> Result<Uuid> {
        let workflow = self
            .workflow_repo
            .get(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        if !workflow.is_executable() {
            return Err(EngineError::NotExecutable(workflow_id));
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| EngineError::AdmissionCancelled)?
            }
            _ = self.shutdown.cancelled() => return Err(EngineError::AdmissionCancelled),
        };

        let execution = WorkflowExecution::new(
            workflow_id,
            trigger_type,
            created_by,
            workflow.variables.clone(),
            input,
        );
        let execution_id = execution.execution_id;
        self.execution_repo.create(&execution).await?;

        self.publish_execution_event(&execution, LifecycleEventKind::ExecutionStarted).await;

        let executor = WorkflowExecutor::new(
            Arc::new(workflow),
            execution,
            Arc::clone(&self.execution_repo),
            Arc::clone(&self.event_sink),
            Arc::clone(&self.registry),
            self.config.default_step_timeout,
        );
        let handle = executor.handle();
        self.live.write().await.insert(execution_id, handle);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = executor.run().await {
                tracing::error!(%execution_id, error = %e, "executor task failed unexpectedly");
            }
            engine.live.write().await.remove(&execution_id);
        });

        Ok(execution_id)
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> Result<WorkflowExecution> {
        self.execution_repo
            .get(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Idempotent (§8): cancelling an already-terminal or already-cancelled
    /// execution is a no-op, not an error.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<()> {
        if let Some(handle) = self.live.read().await.get(&execution_id) {
            handle.cancel();
            return Ok(());
        }
        // Not live: either finished already, or never existed.
        self.execution_repo
            .get(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;
        Ok(())
    }

    pub async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>> {
        self.execution_repo.list(filter).await
    }

    pub async fn workflow_metrics(&self, workflow_id: Uuid) -> Result<WorkflowMetrics> {
        let history = self
            .execution_repo
            .history(workflow_id, self.config.metrics_window)
            .await?;
        Ok(metrics::compute(&history))
    }

    /// Period ≈ `execution_monitor_interval` (§4.1 item 1): for each live
    /// executor, request a timeout stop if it has passed its deadline, and
    /// log a warning (no automatic recovery) if it looks stalled.
    async fn execution_monitor_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.execution_monitor_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let handles: Vec<ExecutorHandle> = self.live.read().await.values().cloned().collect();
                    for handle in handles {
                        if handle.is_timed_out() {
                            tracing::warn!(execution_id = %handle.execution_id, "execution exceeded its deadline, requesting stop");
                            handle.timeout();
                        } else if !handle.is_healthy() {
                            tracing::warn!(execution_id = %handle.execution_id, "execution appears stalled");
                        }
                    }
                }
            }
        }
    }

    /// Period ≈ `scheduler_poll_interval` (§4.1 item 2): ask every
    /// schedule-triggered workflow whether it is due, and synthesize an
    /// internal `Execute` for each due trigger.
    async fn scheduler_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.scheduler_poll_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    self.poll_schedules().await;
                }
            }
        }
    }

    async fn poll_schedules(self: &Arc<Self>) {
        let workflows = match self.workflow_repo.get_by_trigger("schedule").await {
            Ok(workflows) => workflows,
            Err(e) => {
                tracing::warn!(error = %e, "scheduled-trigger poll failed to list workflows");
                return;
            }
        };

        for mut workflow in workflows {
            if !workflow.is_executable() {
                continue;
            }
            let now = Utc::now();
            let mut fired_any = false;

            for trigger in &mut workflow.triggers {
                if trigger.kind != TriggerKind::Schedule || !trigger.is_active {
                    continue;
                }
                let Some(raw) = &trigger.schedule_spec else { continue };
                let spec = ScheduleSpec::parse(raw);
                if !spec.should_fire(trigger.last_triggered, now) {
                    continue;
                }

                match self
                    .execute(workflow.workflow_id, ValueMap::new(), TriggerType::Schedule, None)
                    .await
                {
                    Ok(execution_id) => {
                        tracing::info!(%execution_id, workflow_id = %workflow.workflow_id, "scheduled trigger fired");
                        trigger.last_triggered = Some(now);
                        trigger.trigger_count += 1;
                        fired_any = true;
                    }
                    Err(e) => {
                        tracing::warn!(workflow_id = %workflow.workflow_id, error = %e, "scheduled trigger failed to admit execution");
                    }
                }
            }

            if fired_any {
                if let Err(e) = self.workflow_repo.update(&workflow).await {
                    tracing::warn!(workflow_id = %workflow.workflow_id, error = %e, "failed to persist trigger bookkeeping");
                }
            }
        }
    }

    async fn publish_execution_event(&self, execution: &WorkflowExecution, kind: LifecycleEventKind) {
        let mut data = ValueMap::new();
        data.insert("status", serde_json::to_value(execution.status).unwrap_or_default());
        let event = LifecycleEvent::new(
            kind,
            execution.workflow_id,
            execution.execution_id,
            EventSource::WorkflowEngine,
        )
        .with_data(data);
        if let Err(e) = self.event_sink.publish_execution_event(event).await {
            tracing::warn!(execution_id = %execution.execution_id, error = %e, "execution event publish failed");
        }
    }
}
