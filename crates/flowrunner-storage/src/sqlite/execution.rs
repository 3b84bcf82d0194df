//! SQLite-backed [`ExecutionRepository`]. Execution records are stored as a
//! JSON blob per row (teacher's `WorkflowRunRow` shape), with `workflow_id`,
//! `status`, and `started_at` pulled out as indexed columns for the
//! `history`/`get_active` query shapes the engine actually needs.

use flowrunner_core::error::{EngineError, Result};
use flowrunner_core::repository::ExecutionRepository;
use flowrunner_schemas::execution::{ExecutionFilter, ExecutionStatus, WorkflowExecution};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowExecution> {
    let record: String = row
        .try_get("record")
        .map_err(|e| EngineError::Repository(e.to_string()))?;
    serde_json::from_str(&record)
        .map_err(|e| EngineError::Repository(format!("invalid execution JSON: {e}")))
}

fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
    }
}

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &WorkflowExecution) -> Result<()> {
        let record = serde_json::to_string(execution)
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO executions (id, workflow_id, status, created_by, started_at, record)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.execution_id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(status_str(execution.status))
        .bind(&execution.created_by)
        .bind(execution.started_at.to_rfc3339())
        .bind(&record)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT record FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        row.as_ref().map(row_to_execution).transpose()
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<()> {
        let record = serde_json::to_string(execution)
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        sqlx::query("UPDATE executions SET status = ?, record = ? WHERE id = ?")
            .bind(status_str(execution.status))
            .bind(&record)
            .bind(execution.execution_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        Ok(())
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query("SELECT record FROM executions ORDER BY started_at DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            executions.push(row_to_execution(row)?);
        }

        Ok(executions
            .into_iter()
            .filter(|e| filter.workflow_ids.is_empty() || filter.workflow_ids.contains(&e.workflow_id))
            .filter(|e| filter.statuses.is_empty() || filter.statuses.contains(&e.status))
            .filter(|e| {
                filter
                    .started_after
                    .is_none_or(|after| e.started_at >= after)
            })
            .filter(|e| {
                filter
                    .started_before
                    .is_none_or(|before| e.started_at <= before)
            })
            .collect())
    }

    async fn get_active(&self, workflow_id: Uuid) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query(
            "SELECT record FROM executions WHERE workflow_id = ? AND status IN ('pending', 'running')",
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        rows.iter().map(row_to_execution).collect()
    }

    async fn history(&self, workflow_id: Uuid, limit: u32) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query(
            "SELECT record FROM executions WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(workflow_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        rows.iter().map(row_to_execution).collect()
    }
}
