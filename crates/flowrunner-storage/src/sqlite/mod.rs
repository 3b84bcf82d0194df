pub mod execution;
pub mod pool;
pub mod workflow;

pub use execution::SqliteExecutionRepository;
pub use pool::DatabasePool;
pub use workflow::SqliteWorkflowRepository;
