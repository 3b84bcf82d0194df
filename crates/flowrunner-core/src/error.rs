//! Error taxonomy for the orchestration core (§7 of SPEC_FULL.md).

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine, the executor, and the step dispatcher.
///
/// Control errors (`Cancelled`, `TimedOut`) and admission errors
/// (`NotExecutable`, `WorkflowNotFound`, `AdmissionCancelled`) are not
/// infrastructure failures -- they produce explicit terminal statuses
/// rather than bubbling as unexpected errors (§7).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("workflow {0} is not executable (inactive or archived)")]
    NotExecutable(Uuid),

    #[error("step {0} not found in workflow definition")]
    StepNotFound(String),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("cancelled")]
    Cancelled,

    #[error("admission cancelled before a slot was acquired")]
    AdmissionCancelled,

    #[error("execution timed out")]
    TimedOut,

    #[error("step {step} failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("event sink error: {0}")]
    EventSink(String),

    #[error("agent type {0} is not registered")]
    AgentNotFound(String),

    #[error("agent type {0} is already registered")]
    AgentAlreadyRegistered(String),

    #[error("unsupported action {0}")]
    UnsupportedAction(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// The wire error code this error publishes on a terminal execution
    /// record, per `flowrunner_schemas::execution::error_codes`.
    pub fn code(&self) -> &'static str {
        use flowrunner_schemas::execution::error_codes::*;
        match self {
            EngineError::TimedOut => EXECUTION_TIMEOUT,
            EngineError::StepFailed { .. } => STEP_EXECUTION_FAILED,
            _ => EXECUTION_FAILED,
        }
    }
}
