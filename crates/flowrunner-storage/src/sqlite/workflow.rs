//! SQLite-backed [`WorkflowRepository`]. Workflow definitions are stored as
//! a single JSON blob per row (grounded on
//! `boternity-infra/src/sqlite/workflow.rs`'s `WorkflowDefRow`), with
//! `is_active` pulled out as an indexed column for the scheduler's
//! active-workflow scan.

use flowrunner_core::error::{EngineError, Result};
use flowrunner_core::repository::WorkflowRepository;
use flowrunner_schemas::workflow::{Workflow, WorkflowFilter};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> Result<Workflow> {
    let definition: String = row
        .try_get("definition")
        .map_err(|e| EngineError::Repository(e.to_string()))?;
    serde_json::from_str(&definition)
        .map_err(|e| EngineError::Repository(format!("invalid workflow JSON: {e}")))
}

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create(&self, workflow: &Workflow) -> Result<()> {
        let definition = serde_json::to_string(workflow)
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, is_active, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.workflow_id.to_string())
        .bind(&workflow.name)
        .bind(workflow.is_active as i64)
        .bind(&definition)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        row.as_ref().map(row_to_workflow).transpose()
    }

    async fn update(&self, workflow: &Workflow) -> Result<()> {
        let definition = serde_json::to_string(workflow)
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"UPDATE workflows SET name = ?, is_active = ?, definition = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&workflow.name)
        .bind(workflow.is_active as i64)
        .bind(&definition)
        .bind(workflow.updated_at.to_rfc3339())
        .bind(workflow.workflow_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT definition FROM workflows ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in &rows {
            workflows.push(row_to_workflow(row)?);
        }

        Ok(workflows
            .into_iter()
            .filter(|w| filter.is_active.is_none_or(|active| w.is_active == active))
            .filter(|w| filter.is_template.is_none_or(|tmpl| w.is_template == tmpl))
            .filter(|w| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| w.category.as_deref() == Some(c))
            })
            .collect())
    }

    async fn get_active(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query("SELECT definition FROM workflows WHERE is_active = 1")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        rows.iter().map(row_to_workflow).collect()
    }

    async fn get_by_trigger(&self, trigger_type: &str) -> Result<Vec<Workflow>> {
        // No indexed trigger table: the trigger list is part of the
        // workflow's JSON blob, and the active-workflow set is small
        // enough to filter in process, matching the in-memory double.
        let active = self.get_active().await?;
        Ok(active
            .into_iter()
            .filter(|w| {
                w.triggers
                    .iter()
                    .any(|t| format!("{:?}", t.kind).to_lowercase() == trigger_type)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use chrono::Utc;
    use flowrunner_schemas::value::ValueMap;
    use flowrunner_schemas::workflow::WorkflowDefinition;

    fn sample(name: &str, is_active: bool) -> Workflow {
        Workflow {
            workflow_id: Uuid::now_v7(),
            name: name.to_string(),
            category: None,
            workflow_type: None,
            is_active,
            is_archived: false,
            is_template: false,
            created_by: None,
            tags: Vec::new(),
            config: None,
            triggers: Vec::new(),
            variables: ValueMap::new(),
            definition: WorkflowDefinition {
                start_step: "s1".to_string(),
                steps: HashMap::new(),
                connections: Vec::new(),
                end_steps: HashSet::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn repo() -> (tempfile::TempDir, SqliteWorkflowRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/test.db?mode=rwc", dir.path().display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteWorkflowRepository::new(pool))
    }

    #[tokio::test]
    async fn create_and_get_roundtrips() {
        let (_dir, repo) = repo().await;
        let workflow = sample("demo", true);
        repo.create(&workflow).await.unwrap();

        let fetched = repo.get(workflow.workflow_id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "demo");
    }

    #[tokio::test]
    async fn get_active_filters_inactive() {
        let (_dir, repo) = repo().await;
        repo.create(&sample("active", true)).await.unwrap();
        repo.create(&sample("inactive", false)).await.unwrap();

        let active = repo.get_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "active");
    }

    #[tokio::test]
    async fn update_persists_changes() {
        let (_dir, repo) = repo().await;
        let mut workflow = sample("demo", true);
        repo.create(&workflow).await.unwrap();

        workflow.is_active = false;
        repo.update(&workflow).await.unwrap();

        let fetched = repo.get(workflow.workflow_id).await.unwrap().unwrap();
        assert!(!fetched.is_active);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let (_dir, repo) = repo().await;
        let workflow = sample("demo", true);
        repo.create(&workflow).await.unwrap();

        assert!(repo.delete(workflow.workflow_id).await.unwrap());
        assert!(repo.get(workflow.workflow_id).await.unwrap().is_none());
    }
}
