//! A persisting [`EventSink`]: writes each lifecycle event to an
//! append-only `events` table, then re-publishes it on a
//! `tokio::sync::broadcast` channel, following the same fire-and-forget
//! publish shape as `flowrunner_core::testutil::InMemoryEventSink` (itself
//! grounded on the teacher's `EventBus`). Persistence gives late
//! subscribers (e.g. an HTTP API replaying a run's history) something to
//! read after the fact; the broadcast side serves anyone watching live.

use flowrunner_core::error::{EngineError, Result};
use flowrunner_core::event_sink::EventSink;
use flowrunner_schemas::event::LifecycleEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::sqlite::pool::DatabasePool;

pub struct SqliteEventSink {
    pool: DatabasePool,
    sender: broadcast::Sender<LifecycleEvent>,
}

impl SqliteEventSink {
    pub fn new(pool: DatabasePool) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { pool, sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// The most recent `limit` events for an execution, oldest first.
    pub async fn history(&self, execution_id: Uuid, limit: u32) -> Result<Vec<LifecycleEvent>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT payload FROM events WHERE execution_id = ? ORDER BY timestamp ASC LIMIT ?",
        )
        .bind(execution_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        rows.into_iter()
            .map(|(payload,)| {
                serde_json::from_str(&payload)
                    .map_err(|e| EngineError::Repository(format!("invalid event JSON: {e}")))
            })
            .collect()
    }

    async fn persist_and_publish(&self, event: LifecycleEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| EngineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO events (id, execution_id, workflow_id, kind, timestamp, payload)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.execution_id.to_string())
        .bind(event.workflow_id.to_string())
        .bind(event.kind.as_str())
        .bind(event.timestamp.to_rfc3339())
        .bind(&payload)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| EngineError::Repository(e.to_string()))?;

        // No subscribers is not an error: events are still durable on disk.
        let _ = self.sender.send(event);
        Ok(())
    }
}

impl EventSink for SqliteEventSink {
    async fn publish_workflow_event(&self, event: LifecycleEvent) -> Result<()> {
        self.persist_and_publish(event).await
    }

    async fn publish_execution_event(&self, event: LifecycleEvent) -> Result<()> {
        self.persist_and_publish(event).await
    }

    async fn publish_step_event(&self, event: LifecycleEvent) -> Result<()> {
        self.persist_and_publish(event).await
    }
}
