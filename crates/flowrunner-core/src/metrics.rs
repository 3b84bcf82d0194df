//! Workflow execution metrics (`GetWorkflowMetrics`, §4.1 of spec.md).
//!
//! Aggregated on demand from `ExecutionRepository::history` rather than
//! maintained incrementally -- the teacher's own metrics surface
//! (`boternity-core/src/workflow/metrics.rs`) is likewise a read-time
//! aggregation over stored execution rows, not a running counter.

use std::time::Duration;

use chrono::{DateTime, Utc};
use flowrunner_schemas::execution::{ExecutionStatus, WorkflowExecution};

/// Aggregate statistics over a workflow's most recent executions.
#[derive(Debug, Clone, Default)]
pub struct WorkflowMetrics {
    pub total_executions: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
    pub average_duration: Duration,
    pub p95_duration: Duration,
    pub last_execution_at: Option<DateTime<Utc>>,
}

/// Compute metrics over `history`, most-recent-first, as returned by
/// `ExecutionRepository::history` (Open Question (b) in §9: windowed, not
/// unbounded).
pub fn compute(history: &[WorkflowExecution]) -> WorkflowMetrics {
    let mut metrics = WorkflowMetrics {
        total_executions: history.len() as u32,
        last_execution_at: history.first().map(|e| e.started_at),
        ..Default::default()
    };

    let mut durations: Vec<Duration> = Vec::with_capacity(history.len());
    for execution in history {
        match execution.status {
            ExecutionStatus::Completed => metrics.completed += 1,
            ExecutionStatus::Failed => metrics.failed += 1,
            ExecutionStatus::Cancelled => metrics.cancelled += 1,
            _ => {}
        }
        if let Some(duration) = execution.duration {
            durations.push(duration);
        }
    }

    if !durations.is_empty() {
        let total: Duration = durations.iter().sum();
        metrics.average_duration = total / durations.len() as u32;

        durations.sort();
        let index = ((durations.len() as f64) * 0.95).ceil() as usize;
        let index = index.saturating_sub(1).min(durations.len() - 1);
        metrics.p95_duration = durations[index];
    }

    metrics
}
