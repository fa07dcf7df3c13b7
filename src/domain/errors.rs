//! Domain errors for the switchover engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classification of a failure, used for retry decisions and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Precondition or invariant violation.
    Validation,
    /// A stage returned a failure or panicked.
    StageExecution,
    /// Infrastructure failure (persistence, runtime).
    System,
    /// Domain-specific rejection raised by a stage.
    Business,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::StageExecution => "stage_execution",
            Self::System => "system",
            Self::Business => "business",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level errors raised by the aggregate, executor and services.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid state transition: cannot {operation} while {from}")]
    InvalidStateTransition { from: String, operation: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Retry limit reached: {retry_count} of {max_retry} retries used")]
    RetryLimitExceeded { retry_count: u32, max_retry: u32 },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Checkpoint not found for task: {0}")]
    CheckpointNotFound(String),

    #[error("Tenant {tenant_id} already has a running task: {running_task_id}")]
    TenantConflict {
        tenant_id: String,
        running_task_id: String,
    },

    #[error("Rollback unavailable: {0}")]
    RollbackUnavailable(String),

    #[error("Stage {stage} failed: {message}")]
    StageExecution {
        stage: String,
        message: String,
        retriable: bool,
    },

    #[error("Business rule rejected: {0}")]
    Business(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("System error: {0}")]
    SystemError(String),
}

impl DomainError {
    /// Shorthand for an out-of-order lifecycle call.
    pub fn invalid_transition(from: impl std::fmt::Display, operation: &str) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Classify this error against the failure taxonomy.
    pub fn kind(&self) -> ErrorType {
        match self {
            Self::InvalidStateTransition { .. }
            | Self::ValidationFailed(_)
            | Self::RetryLimitExceeded { .. }
            | Self::RollbackUnavailable(_)
            | Self::TenantConflict { .. } => ErrorType::Validation,
            Self::StageExecution { .. } => ErrorType::StageExecution,
            Self::Business(_) => ErrorType::Business,
            Self::TaskNotFound(_)
            | Self::CheckpointNotFound(_)
            | Self::DatabaseError(_)
            | Self::SerializationError(_)
            | Self::SystemError(_) => ErrorType::System,
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            DomainError::invalid_transition("RUNNING", "start").kind(),
            ErrorType::Validation
        );
        assert_eq!(
            DomainError::RetryLimitExceeded { retry_count: 2, max_retry: 2 }.kind(),
            ErrorType::Validation
        );
        assert_eq!(DomainError::Business("quota".into()).kind(), ErrorType::Business);
        assert_eq!(DomainError::DatabaseError("down".into()).kind(), ErrorType::System);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = DomainError::invalid_transition("COMPLETED", "resume");
        assert_eq!(
            err.to_string(),
            "Invalid state transition: cannot resume while COMPLETED"
        );
    }

    #[test]
    fn test_error_type_serde() {
        let json = serde_json::to_string(&ErrorType::StageExecution).unwrap();
        assert_eq!(json, "\"stage_execution\"");
    }
}
