//! Failure details and per-stage results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, ErrorType};

/// Structured description of why a stage or task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub error_type: ErrorType,
    pub message: String,
    pub stage_name: Option<String>,
    pub retriable: bool,
    pub occurred_at: DateTime<Utc>,
}

impl FailureInfo {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            stage_name: None,
            retriable: matches!(error_type, ErrorType::System | ErrorType::StageExecution),
            occurred_at: Utc::now(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorType::System, message)
    }

    pub fn stage(stage_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorType::StageExecution, message).at_stage(stage_name)
    }

    pub fn at_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }

    pub fn retriable(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }
}

impl From<&DomainError> for FailureInfo {
    fn from(err: &DomainError) -> Self {
        let info = Self::new(err.kind(), err.to_string());
        match err {
            DomainError::StageExecution {
                stage, retriable, ..
            } => info.at_stage(stage.clone()).retriable(*retriable),
            _ => info,
        }
    }
}

impl std::fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stage_name {
            Some(stage) => write!(f, "[{}] {}: {}", self.error_type, stage, self.message),
            None => write!(f, "[{}] {}", self.error_type, self.message),
        }
    }
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageResultStatus {
    Success,
    Failed,
    Skipped,
}

/// Recorded result of executing (or skipping) a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageResultStatus,
    pub duration_ms: Option<u64>,
    pub failure: Option<FailureInfo>,
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    pub fn success(stage_name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageResultStatus::Success,
            duration_ms: Some(duration_ms),
            failure: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(stage_name: impl Into<String>, failure: FailureInfo) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageResultStatus::Failed,
            duration_ms: None,
            failure: Some(failure),
            finished_at: Utc::now(),
        }
    }

    pub fn skipped(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageResultStatus::Skipped,
            duration_ms: None,
            failure: None,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageResultStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_stage_error() {
        let err = DomainError::StageExecution {
            stage: "switch".into(),
            message: "gateway returned 503".into(),
            retriable: false,
        };
        let info = FailureInfo::from(&err);
        assert_eq!(info.error_type, ErrorType::StageExecution);
        assert_eq!(info.stage_name.as_deref(), Some("switch"));
        assert!(!info.retriable);
    }

    #[test]
    fn test_business_failures_not_retriable_by_default() {
        assert!(!FailureInfo::new(ErrorType::Business, "denied").retriable);
        assert!(FailureInfo::system("db down").retriable);
    }

    #[test]
    fn test_failure_display() {
        let info = FailureInfo::stage("verify", "health check timed out");
        assert_eq!(
            info.to_string(),
            "[stage_execution] verify: health check timed out"
        );
    }
}
