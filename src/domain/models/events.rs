//! Task lifecycle domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::failure::FailureInfo;
use super::task::{TaskIdentity, TaskStatus};

/// A lifecycle event with a snapshot of the task that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDomainEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub task: TaskIdentity,
    pub status: TaskStatus,
    pub payload: TaskEventPayload,
}

impl TaskDomainEvent {
    pub fn new(task: TaskIdentity, status: TaskStatus, payload: TaskEventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            task,
            status,
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn task_id(&self) -> &str {
        &self.task.task_id
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEventPayload {
    TaskStarted {
        total_stages: usize,
        start_index: usize,
    },
    TaskStageStarted {
        stage_name: String,
        stage_index: usize,
        total_steps: usize,
    },
    TaskStageCompleted {
        stage_name: String,
        stage_index: usize,
        duration_ms: u64,
        skipped: bool,
    },
    TaskStageFailed {
        stage_name: String,
        failure: FailureInfo,
    },
    TaskCompleted {
        duration_ms: Option<u64>,
        completed_stages: Vec<String>,
    },
    TaskFailed {
        failure: FailureInfo,
        completed_stages: Vec<String>,
        failed_stage: Option<String>,
    },
    TaskPaused {
        next_stage_index: usize,
    },
    TaskResumed {
        next_stage_index: usize,
    },
    TaskCancelled {
        cancelled_by: Option<String>,
        last_stage: Option<String>,
    },
    TaskRetryStarted {
        retry_count: u32,
        from_checkpoint: bool,
    },
    TaskRollingBack {
        stages_to_replay: Vec<String>,
    },
    TaskRolledBack {
        replayed_stages: Vec<String>,
        duration_ms: Option<u64>,
    },
    TaskRollbackFailed {
        failure: FailureInfo,
        completed_stages: Vec<String>,
        failed_stage: Option<String>,
    },
    /// Periodic heartbeat, independent of stage duration.
    TaskProgress {
        completed_stages: usize,
        total_stages: usize,
        current_stage: Option<String>,
    },
}

impl TaskEventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskStarted { .. } => "TaskStarted",
            Self::TaskStageStarted { .. } => "TaskStageStarted",
            Self::TaskStageCompleted { .. } => "TaskStageCompleted",
            Self::TaskStageFailed { .. } => "TaskStageFailed",
            Self::TaskCompleted { .. } => "TaskCompleted",
            Self::TaskFailed { .. } => "TaskFailed",
            Self::TaskPaused { .. } => "TaskPaused",
            Self::TaskResumed { .. } => "TaskResumed",
            Self::TaskCancelled { .. } => "TaskCancelled",
            Self::TaskRetryStarted { .. } => "TaskRetryStarted",
            Self::TaskRollingBack { .. } => "TaskRollingBack",
            Self::TaskRolledBack { .. } => "TaskRolledBack",
            Self::TaskRollbackFailed { .. } => "TaskRollbackFailed",
            Self::TaskProgress { .. } => "TaskProgress",
        }
    }

    /// Whether this event ends a task run (as opposed to a stage).
    pub fn is_run_terminal(&self) -> bool {
        matches!(
            self,
            Self::TaskCompleted { .. }
                | Self::TaskFailed { .. }
                | Self::TaskPaused { .. }
                | Self::TaskCancelled { .. }
                | Self::TaskRolledBack { .. }
                | Self::TaskRollbackFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TaskIdentity {
        TaskIdentity {
            task_id: "task-1".into(),
            plan_id: "plan-1".into(),
            tenant_id: "tenant-a".into(),
        }
    }

    #[test]
    fn test_event_serde_shape() {
        let event = TaskDomainEvent::new(
            identity(),
            TaskStatus::Running,
            TaskEventPayload::TaskStageStarted {
                stage_name: "switch".into(),
                stage_index: 1,
                total_steps: 1,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["type"], "TaskStageStarted");
        assert_eq!(value["payload"]["data"]["stage_name"], "switch");
        assert_eq!(value["status"], "RUNNING");

        let back: TaskDomainEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_run_terminal_kinds() {
        assert!(TaskEventPayload::TaskPaused { next_stage_index: 1 }.is_run_terminal());
        assert!(!TaskEventPayload::TaskResumed { next_stage_index: 1 }.is_run_terminal());
        assert!(!TaskEventPayload::TaskProgress {
            completed_stages: 0,
            total_stages: 1,
            current_stage: None
        }
        .is_run_terminal());
    }
}
