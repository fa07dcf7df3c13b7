//! Stage port - interface for units of deployment work.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::errors::{DomainResult, ErrorType};
use crate::domain::models::{FailureInfo, TargetVersion, TaskAggregate, TaskRuntimeContext};

/// Failure reported by a stage.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StageError {
    pub error_type: ErrorType,
    pub message: String,
    pub retriable: bool,
}

impl StageError {
    /// Infrastructure failure (timeouts, unreachable dependencies). Retriable.
    pub fn system(message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::System,
            message: message.into(),
            retriable: true,
        }
    }

    /// Domain rejection. Not retriable unless marked otherwise.
    pub fn business(message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Business,
            message: message.into(),
            retriable: false,
        }
    }

    pub fn retriable(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }

    pub fn into_failure(self, stage_name: &str) -> FailureInfo {
        FailureInfo::new(self.error_type, self.message)
            .at_stage(stage_name)
            .retriable(self.retriable)
    }
}

/// One unit of deployment work, supplied by the embedding application.
///
/// Stages may be re-executed after a crash that happened before their
/// checkpoint was written, so `execute` should be idempotent where feasible.
/// The engine never interrupts `execute`; a stage owns its own timeouts.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Steps reported in the stage-started event.
    fn total_steps(&self) -> usize {
        1
    }

    /// Whether the stage has nothing to do in this context.
    async fn can_skip(&self, _ctx: &TaskRuntimeContext) -> bool {
        false
    }

    async fn execute(&self, ctx: &TaskRuntimeContext) -> Result<(), StageError>;

    /// Unused by forward-replay rollback; kept for stage implementations
    /// that want to expose an undo.
    async fn rollback(&self, _ctx: &TaskRuntimeContext) -> Result<(), StageError> {
        Ok(())
    }
}

/// Builds the ordered stage list for a task and a version.
///
/// Rollback asks for the stages of the task's previous version.
pub trait StageFactory: Send + Sync {
    fn build_stages(
        &self,
        task: &TaskAggregate,
        version: &TargetVersion,
    ) -> DomainResult<Vec<Arc<dyn Stage>>>;
}

/// Names of `stages`, in order.
pub fn stage_names(stages: &[Arc<dyn Stage>]) -> Vec<String> {
    stages.iter().map(|s| s.name().to_string()).collect()
}
