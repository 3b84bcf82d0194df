//! SQLite-backed `WorkflowRepository`/`ExecutionRepository` and a
//! persisting `EventSink`, following the teacher's split reader/writer
//! pool pattern (`boternity-infra/src/sqlite`).

pub mod event_sink;
pub mod sqlite;

pub use event_sink::SqliteEventSink;
pub use sqlite::{DatabasePool, SqliteExecutionRepository, SqliteWorkflowRepository};
