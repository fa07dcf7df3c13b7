//! Task aggregate: the per-tenant deployment task lifecycle.
//!
//! ```text
//! CREATED → PENDING → RUNNING → PAUSED | COMPLETED | FAILED | CANCELLED
//!                        ↑  ↓
//!                       PAUSED
//! FAILED → PENDING (retry or rollback)
//! ```
//!
//! Rollback is not a state. It is the ordinary PENDING → RUNNING → COMPLETED
//! path run with `rollback_intent` set; only the emitted events differ.

use serde::{Deserialize, Serialize};

use super::checkpoint::TaskCheckpoint;
use super::events::{TaskDomainEvent, TaskEventPayload};
use super::execution_range::ExecutionRange;
use super::failure::{FailureInfo, StageResult};
use super::retry_policy::RetryPolicy;
use super::stage_progress::StageProgress;
use super::time_range::{TaskDuration, TimeRange};
use crate::domain::errors::{DomainError, DomainResult};

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Constructed; stages not yet attached or not yet queued.
    Created,
    /// Queued for a run.
    Pending,
    /// A run is executing stages.
    Running,
    /// Stopped at a stage boundary on request.
    Paused,
    /// Every stage in the execution range succeeded.
    Completed,
    /// A stage failed or the run was interrupted. Retriable.
    Failed,
    /// Cancelled by an operator.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATED" => Some(Self::Created),
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "PAUSED" => Some(Self::Paused),
            "COMPLETED" | "COMPLETE" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transition, except retry out of FAILED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Created => vec![Self::Pending, Self::Failed, Self::Cancelled],
            Self::Pending => vec![Self::Running, Self::Failed, Self::Cancelled],
            Self::Running => vec![
                Self::Paused,
                Self::Completed,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Paused => vec![Self::Running, Self::Failed, Self::Cancelled],
            Self::Failed => vec![Self::Pending],
            Self::Completed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task / plan / tenant identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity {
    pub task_id: String,
    pub plan_id: String,
    pub tenant_id: String,
}

impl TaskIdentity {
    pub fn new(
        task_id: impl Into<String>,
        plan_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            plan_id: plan_id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

/// Deployment version descriptor the task switches traffic to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetVersion {
    pub version: String,
    /// Opaque configuration handed to stage construction.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl TargetVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// One tenant's deployment task.
///
/// Transition methods append to an internal event buffer. Callers publish
/// [`TaskAggregate::drain_events`] after each batch; the buffer never
/// survives serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAggregate {
    identity: TaskIdentity,
    target_version: TargetVersion,
    previous_version: Option<TargetVersion>,
    status: TaskStatus,
    stage_progress: Option<StageProgress>,
    execution_range: Option<ExecutionRange>,
    retry_policy: RetryPolicy,
    checkpoint: Option<TaskCheckpoint>,
    time_range: TimeRange,
    rollback_intent: bool,
    pause_requested: bool,
    cancelled_by: Option<String>,
    stage_results: Vec<StageResult>,
    last_failure: Option<FailureInfo>,
    #[serde(skip)]
    events: Vec<TaskDomainEvent>,
}

impl TaskAggregate {
    pub fn new(identity: TaskIdentity, target_version: TargetVersion) -> Self {
        Self {
            identity,
            target_version,
            previous_version: None,
            status: TaskStatus::Created,
            stage_progress: None,
            execution_range: None,
            retry_policy: RetryPolicy::new(),
            checkpoint: None,
            time_range: TimeRange::new(),
            rollback_intent: false,
            pause_requested: false,
            cancelled_by: None,
            stage_results: Vec::new(),
            last_failure: None,
            events: Vec::new(),
        }
    }

    pub fn with_previous_version(mut self, previous: TargetVersion) -> Self {
        self.previous_version = Some(previous);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    // -- Accessors --

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    pub fn task_id(&self) -> &str {
        &self.identity.task_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.identity.tenant_id
    }

    pub fn plan_id(&self) -> &str {
        &self.identity.plan_id
    }

    pub fn target_version(&self) -> &TargetVersion {
        &self.target_version
    }

    pub fn previous_version(&self) -> Option<&TargetVersion> {
        self.previous_version.as_ref()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn stage_progress(&self) -> Option<&StageProgress> {
        self.stage_progress.as_ref()
    }

    pub fn execution_range(&self) -> Option<&ExecutionRange> {
        self.execution_range.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn checkpoint(&self) -> Option<&TaskCheckpoint> {
        self.checkpoint.as_ref()
    }

    pub fn time_range(&self) -> &TimeRange {
        &self.time_range
    }

    pub fn duration(&self) -> TaskDuration {
        self.time_range.duration()
    }

    pub fn is_rollback_intent(&self) -> bool {
        self.rollback_intent
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested
    }

    pub fn cancelled_by(&self) -> Option<&str> {
        self.cancelled_by.as_deref()
    }

    pub fn stage_results(&self) -> &[StageResult] {
        &self.stage_results
    }

    pub fn last_failure(&self) -> Option<&FailureInfo> {
        self.last_failure.as_ref()
    }

    pub fn current_stage_index(&self) -> usize {
        self.stage_progress
            .as_ref()
            .map_or(0, StageProgress::current_stage_index)
    }

    pub fn total_stages(&self) -> usize {
        self.stage_progress
            .as_ref()
            .map_or(0, StageProgress::total_stages)
    }

    pub fn stage_names(&self) -> &[String] {
        self.stage_progress
            .as_ref()
            .map_or(&[][..], StageProgress::stage_names)
    }

    pub fn completed_stage_names(&self) -> Vec<String> {
        self.stage_progress
            .as_ref()
            .map(StageProgress::completed_stage_names)
            .unwrap_or_default()
    }

    /// Progress has reached the effective end of the execution range.
    ///
    /// Retry and rollback ranges may finish before the last stage, so this is
    /// not the same as "index reached the stage count".
    pub fn is_execution_completed(&self) -> bool {
        match (&self.stage_progress, &self.execution_range) {
            (Some(progress), Some(range)) => {
                progress.current_stage_index()
                    >= range.effective_end_index(progress.total_stages())
            }
            _ => false,
        }
    }

    // -- Events --

    pub fn pending_events(&self) -> &[TaskDomainEvent] {
        &self.events
    }

    /// Take the buffered events, leaving the buffer empty.
    pub fn drain_events(&mut self) -> Vec<TaskDomainEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, payload: TaskEventPayload) {
        self.events.push(TaskDomainEvent::new(
            self.identity.clone(),
            self.status,
            payload,
        ));
    }

    fn require(&self, expected: TaskStatus, operation: &str) -> DomainResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self.status, operation))
        }
    }

    fn progress(&self) -> DomainResult<&StageProgress> {
        self.stage_progress.as_ref().ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "task {} has no stages attached",
                self.identity.task_id
            ))
        })
    }

    fn range(&self) -> ExecutionRange {
        self.execution_range
            .unwrap_or_else(|| ExecutionRange::full(self.total_stages()))
    }

    // -- Setup --

    /// Attach the ordered stage list: progress at 0, full execution range.
    ///
    /// Also used before a rollback to swap in the stages built from the
    /// previous version.
    pub fn set_total_stages(&mut self, stage_names: Vec<String>) -> DomainResult<()> {
        if !matches!(
            self.status,
            TaskStatus::Created | TaskStatus::Pending | TaskStatus::Failed
        ) {
            return Err(DomainError::invalid_transition(self.status, "attach stages"));
        }
        let progress = StageProgress::initial(stage_names)?;
        self.execution_range = Some(ExecutionRange::full(progress.total_stages()));
        self.stage_progress = Some(progress);
        Ok(())
    }

    pub fn mark_as_pending(&mut self) -> DomainResult<()> {
        self.require(TaskStatus::Created, "mark as pending")?;
        self.progress()?;
        self.status = TaskStatus::Pending;
        Ok(())
    }

    // -- Run lifecycle --

    pub fn start(&mut self) -> DomainResult<()> {
        self.require(TaskStatus::Pending, "start")?;
        let total_stages = self.progress()?.total_stages();
        let range = self.range();
        self.status = TaskStatus::Running;
        self.time_range = self.time_range.start();
        self.pause_requested = false;
        self.cancelled_by = None;

        if self.rollback_intent {
            let stages_to_replay = self.names_in_range(&range);
            self.emit(TaskEventPayload::TaskRollingBack { stages_to_replay });
        } else {
            self.emit(TaskEventPayload::TaskStarted {
                total_stages,
                start_index: range.start_index(),
            });
        }
        Ok(())
    }

    /// Flag a pause; the status changes only at the next stage boundary.
    pub fn request_pause(&mut self) -> DomainResult<()> {
        self.require(TaskStatus::Running, "request pause")?;
        self.pause_requested = true;
        Ok(())
    }

    /// Pause if requested. Only the executor calls this, between stages.
    ///
    /// Returns whether the task paused.
    pub fn apply_pause_at_stage_boundary(&mut self) -> bool {
        if !(self.pause_requested && self.status == TaskStatus::Running) {
            return false;
        }
        self.status = TaskStatus::Paused;
        self.pause_requested = false;
        let next_stage_index = self.current_stage_index();
        self.emit(TaskEventPayload::TaskPaused { next_stage_index });
        true
    }

    pub fn resume(&mut self) -> DomainResult<()> {
        self.require(TaskStatus::Paused, "resume")?;
        self.status = TaskStatus::Running;
        let next_stage_index = self.current_stage_index();
        self.emit(TaskEventPayload::TaskResumed { next_stage_index });
        Ok(())
    }

    pub fn cancel(&mut self, cancelled_by: Option<String>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(self.status, "cancel"));
        }
        self.status = TaskStatus::Cancelled;
        self.time_range = self.time_range.end();
        self.pause_requested = false;
        self.cancelled_by.clone_from(&cancelled_by);
        let last_stage = self.completed_stage_names().pop();
        self.emit(TaskEventPayload::TaskCancelled {
            cancelled_by,
            last_stage,
        });
        Ok(())
    }

    // -- Stages --

    fn require_current_stage(&self, stage_name: &str, operation: &str) -> DomainResult<usize> {
        self.require(TaskStatus::Running, operation)?;
        let progress = self.progress()?;
        match progress.current_stage_name() {
            Some(current) if current == stage_name => Ok(progress.current_stage_index()),
            current => Err(DomainError::ValidationFailed(format!(
                "cannot {operation} '{stage_name}': current stage is {}",
                current.unwrap_or("<none>")
            ))),
        }
    }

    pub fn start_stage(&mut self, stage_name: &str, total_steps: usize) -> DomainResult<()> {
        let stage_index = self.require_current_stage(stage_name, "start stage")?;
        self.emit(TaskEventPayload::TaskStageStarted {
            stage_name: stage_name.to_string(),
            stage_index,
            total_steps,
        });
        Ok(())
    }

    pub fn complete_stage(&mut self, stage_name: &str, duration_ms: u64) -> DomainResult<()> {
        let stage_index = self.require_current_stage(stage_name, "complete stage")?;
        self.stage_progress = self.stage_progress.as_ref().map(StageProgress::next);
        self.stage_results
            .push(StageResult::success(stage_name, duration_ms));
        self.emit(TaskEventPayload::TaskStageCompleted {
            stage_name: stage_name.to_string(),
            stage_index,
            duration_ms,
            skipped: false,
        });
        Ok(())
    }

    /// Advance past a stage that reported it can be skipped.
    pub fn skip_stage(&mut self, stage_name: &str) -> DomainResult<()> {
        let stage_index = self.require_current_stage(stage_name, "skip stage")?;
        self.stage_progress = self.stage_progress.as_ref().map(StageProgress::next);
        self.stage_results.push(StageResult::skipped(stage_name));
        self.emit(TaskEventPayload::TaskStageCompleted {
            stage_name: stage_name.to_string(),
            stage_index,
            duration_ms: 0,
            skipped: true,
        });
        Ok(())
    }

    /// Record a stage failure. The task status is left to the caller.
    pub fn fail_stage(&mut self, stage_name: &str, failure: FailureInfo) -> DomainResult<()> {
        self.require(TaskStatus::Running, "fail stage")?;
        let failure = if failure.stage_name.is_none() {
            failure.at_stage(stage_name)
        } else {
            failure
        };
        self.stage_results
            .push(StageResult::failed(stage_name, failure.clone()));
        self.emit(TaskEventPayload::TaskStageFailed {
            stage_name: stage_name.to_string(),
            failure,
        });
        Ok(())
    }

    // -- Terminal transitions --

    pub fn complete(&mut self) -> DomainResult<()> {
        self.require(TaskStatus::Running, "complete")?;
        if !self.is_execution_completed() {
            return Err(DomainError::ValidationFailed(format!(
                "cannot complete task {}: stage {} of range {} not reached",
                self.identity.task_id,
                self.current_stage_index(),
                self.range()
            )));
        }
        self.status = TaskStatus::Completed;
        self.time_range = self.time_range.end();
        let duration_ms = self.duration().as_millis();

        if self.rollback_intent {
            let replayed_stages = self.names_in_range(&self.range());
            self.emit(TaskEventPayload::TaskRolledBack {
                replayed_stages,
                duration_ms,
            });
            self.rollback_intent = false;
        } else {
            let completed_stages = self.completed_stage_names();
            self.emit(TaskEventPayload::TaskCompleted {
                duration_ms,
                completed_stages,
            });
        }
        Ok(())
    }

    /// Fail the task. A no-op when already terminal.
    ///
    /// While a rollback is in progress the intent is kept, so a retry
    /// continues the rollback.
    pub fn fail(&mut self, failure: FailureInfo) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.time_range = self.time_range.end();
        self.pause_requested = false;
        self.last_failure = Some(failure.clone());

        let completed_stages = self.completed_stage_names();
        let failed_stage = failure.stage_name.clone().or_else(|| {
            self.stage_progress
                .as_ref()
                .and_then(StageProgress::current_stage_name)
                .map(str::to_string)
        });
        let payload = if self.rollback_intent {
            TaskEventPayload::TaskRollbackFailed {
                failure,
                completed_stages,
                failed_stage,
            }
        } else {
            TaskEventPayload::TaskFailed {
                failure,
                completed_stages,
                failed_stage,
            }
        };
        self.emit(payload);
    }

    // -- Retry / rollback --

    /// Move FAILED → PENDING, consuming one retry.
    ///
    /// A full retry resets progress, range and checkpoint. A checkpoint retry
    /// leaves them as installed by [`TaskAggregate::prepare_retry_range`].
    pub fn retry(&mut self, from_checkpoint: bool, global_max_retry: Option<u32>) -> DomainResult<()> {
        self.require(TaskStatus::Failed, "retry")?;
        self.retry_policy = self.retry_policy.increment(global_max_retry)?;

        if !from_checkpoint {
            let progress = self.progress()?.reset();
            self.execution_range = Some(ExecutionRange::full(progress.total_stages()));
            self.stage_progress = Some(progress);
            self.checkpoint = None;
        }
        self.status = TaskStatus::Pending;
        self.pause_requested = false;
        let retry_count = self.retry_policy.retry_count();
        self.emit(TaskEventPayload::TaskRetryStarted {
            retry_count,
            from_checkpoint,
        });
        Ok(())
    }

    /// Move FAILED → PENDING with rollback intent. Not counted as a retry.
    ///
    /// Callers attach the previous version's stages and call
    /// [`TaskAggregate::prepare_rollback_range`] first.
    pub fn begin_rollback(&mut self) -> DomainResult<()> {
        self.require(TaskStatus::Failed, "roll back")?;
        self.progress()?;
        self.rollback_intent = true;
        self.status = TaskStatus::Pending;
        self.pause_requested = false;
        Ok(())
    }

    /// Install the rollback range `[0, last_completed + 2)` and reset progress.
    ///
    /// Without a checkpoint only the first stage was touched: `[0, 1)`.
    pub fn prepare_rollback_range(&mut self) -> DomainResult<()> {
        let progress = self.progress()?.reset();
        let range = match &self.checkpoint {
            Some(checkpoint) => ExecutionRange::for_rollback(checkpoint),
            None => ExecutionRange::new(0, Some(1))?,
        };
        self.execution_range = Some(range);
        self.stage_progress = Some(progress);
        Ok(())
    }

    /// Install the retry range after `checkpoint` and rebuild progress from it.
    ///
    /// A rollback keeps its end bound; if the checkpoint already reached it,
    /// the range is empty and the retry run completes without stages.
    pub fn prepare_retry_range(&mut self, checkpoint: TaskCheckpoint) -> DomainResult<()> {
        let progress = StageProgress::of(&checkpoint)?;
        let total = progress.total_stages();
        let range = match (self.rollback_intent, self.execution_range) {
            (true, Some(current)) => {
                ExecutionRange::for_rollback_retry(&checkpoint, current.effective_end_index(total))
            }
            _ => ExecutionRange::for_retry(&checkpoint, total),
        };
        self.execution_range = Some(range);
        self.stage_progress = Some(progress);
        self.checkpoint = Some(checkpoint);
        Ok(())
    }

    // -- Checkpoints --

    /// Replace the checkpoint with one at `last_index`.
    pub fn record_checkpoint(
        &mut self,
        completed_stage_names: Vec<String>,
        last_index: usize,
    ) -> DomainResult<TaskCheckpoint> {
        self.require(TaskStatus::Running, "record checkpoint")?;
        let all_stage_names = self.progress()?.stage_names().to_vec();
        if last_index >= all_stage_names.len() {
            return Err(DomainError::ValidationFailed(format!(
                "checkpoint index {last_index} outside [0, {})",
                all_stage_names.len()
            )));
        }
        let checkpoint = TaskCheckpoint::new(last_index, completed_stage_names, all_stage_names);
        self.checkpoint = Some(checkpoint.clone());
        Ok(checkpoint)
    }

    /// Rebuild progress from a persisted checkpoint. Status is unchanged.
    pub fn restore_from_checkpoint(&mut self, checkpoint: TaskCheckpoint) -> DomainResult<()> {
        self.stage_progress = Some(StageProgress::of(&checkpoint)?);
        if self.execution_range.is_none() {
            self.execution_range = Some(ExecutionRange::full(checkpoint.total_stages()));
        }
        self.checkpoint = Some(checkpoint);
        Ok(())
    }

    pub fn clear_checkpoint(&mut self) {
        self.checkpoint = None;
    }

    fn names_in_range(&self, range: &ExecutionRange) -> Vec<String> {
        let names = self.stage_names();
        let end = range.effective_end_index(names.len());
        names
            .get(range.start_index().min(end)..end)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }
}
