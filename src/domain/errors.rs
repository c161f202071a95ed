//! Domain errors for the equiwatch trigger pipeline.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::ports::capability::CapabilityError;

/// Domain-level errors that can occur while processing triggers.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Trigger not found: {0}")]
    TriggerNotFound(Uuid),

    #[error("Investigation not found: {0}")]
    InvestigationNotFound(Uuid),

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(Uuid),

    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    /// The stored status no longer matches what the caller last saw.
    #[error("Trigger {id} status conflict: expected {expected}, found {actual}")]
    StatusConflict { id: Uuid, expected: String, actual: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Capability call failed: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Malformed {stage} output: {detail}")]
    MalformedOutput { stage: String, detail: String },
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
