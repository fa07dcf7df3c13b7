//! Result of a single executor run.

use serde::{Deserialize, Serialize};

use super::failure::FailureInfo;
use super::task::TaskStatus;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl RunOutcome {
    pub fn from_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed => Some(Self::Completed),
            TaskStatus::Failed => Some(Self::Failed),
            TaskStatus::Paused => Some(Self::Paused),
            TaskStatus::Cancelled => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Summary returned by the executor when a run stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    pub task_id: String,
    pub outcome: RunOutcome,
    pub final_status: TaskStatus,
    /// Stages executed successfully during this run, in order.
    pub executed_stages: Vec<String>,
    /// Stages skipped during this run.
    pub skipped_stages: Vec<String>,
    pub failure: Option<FailureInfo>,
    pub duration_ms: u64,
}

impl TaskExecutionResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}
