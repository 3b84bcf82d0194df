// Error types for the data model layer.

use thiserror::Error;

/// Result type alias for schema validation operations.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Errors raised while validating a workflow definition against its own
/// invariants (§3 of SPEC_FULL.md).
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("start_step {0:?} is not present in steps")]
    StartStepMissing(String),

    #[error("connection references unknown step {0:?}")]
    DanglingConnection(String),

    #[error("step {0:?} is not present in steps")]
    UnknownStep(String),
}
