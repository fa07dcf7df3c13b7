//! Task executor.
//!
//! Drives one task's stages inside its current [`ExecutionRange`], one at a
//! time and in order. After every completed or skipped stage the checkpoint is
//! persisted before the stage-completed event is published, so a crash never
//! leaves observers ahead of durable state. Pause and cancel are cooperative:
//! flags set on the [`TaskRuntimeContext`] are honoured only between stages.
//!
//! Stage failures (including panics) fail the task and end the run with
//! `Ok(..)`. Infrastructure failures fail the task and are returned as `Err`.
//! Invalid aggregate transitions are returned as `Err` without touching status.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::domain::errors::{DomainError, DomainResult, ErrorType};
use crate::domain::models::{
    Config, ExecutionRange, FailureInfo, RunOutcome, TaskAggregate, TaskExecutionResult,
    TaskRuntimeContext, TaskStatus,
};
use crate::domain::ports::{
    stage_names, CheckpointRepository, ConflictRegistry, DomainEventPublisher, Stage,
    TaskRepository,
};
use crate::services::heartbeat::{HeartbeatScheduler, ProgressGauge};

/// Collaborators shared by every executor.
#[derive(Clone)]
pub struct ExecutorDeps {
    pub checkpoints: Arc<dyn CheckpointRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub publisher: Arc<dyn DomainEventPublisher>,
    pub conflicts: Arc<dyn ConflictRegistry>,
}

/// Per-run knobs derived from [`Config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSettings {
    /// `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    pub global_max_retry: Option<u32>,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config
                .executor
                .heartbeat_enabled
                .then(|| config.executor.heartbeat_interval()),
            global_max_retry: config.retry.global_max_retry,
        }
    }
}

#[derive(Default)]
struct RunLog {
    executed: Vec<String>,
    skipped: Vec<String>,
}

pub struct TaskExecutor {
    task: TaskAggregate,
    stages: Vec<Arc<dyn Stage>>,
    context: TaskRuntimeContext,
    deps: ExecutorDeps,
    settings: RunSettings,
    gauge: ProgressGauge,
    heartbeat: Option<HeartbeatScheduler>,
}

impl TaskExecutor {
    /// Bind `stages` to `task`.
    ///
    /// A task without stages gets them attached; otherwise the stage names
    /// must match the ones already recorded on the aggregate.
    pub fn new(
        mut task: TaskAggregate,
        stages: Vec<Arc<dyn Stage>>,
        context: TaskRuntimeContext,
        deps: ExecutorDeps,
        settings: RunSettings,
    ) -> DomainResult<Self> {
        let names = stage_names(&stages);
        if task.stage_progress().is_none() {
            task.set_total_stages(names.clone())?;
        } else if task.stage_names() != names.as_slice() {
            return Err(DomainError::ValidationFailed(format!(
                "stages {names:?} do not match task {} stages {:?}",
                task.task_id(),
                task.stage_names()
            )));
        }
        if context.task_id() != task.task_id() {
            return Err(DomainError::ValidationFailed(format!(
                "runtime context belongs to task {}, not {}",
                context.task_id(),
                task.task_id()
            )));
        }

        let gauge = ProgressGauge::new(names);
        gauge.set_completed(task.current_stage_index());
        let heartbeat = settings.heartbeat_interval.map(|interval| {
            HeartbeatScheduler::new(
                task.identity().clone(),
                interval,
                gauge.clone(),
                Arc::clone(&deps.publisher),
            )
        });

        Ok(Self {
            task,
            stages,
            context,
            deps,
            settings,
            gauge,
            heartbeat,
        })
    }

    pub fn task(&self) -> &TaskAggregate {
        &self.task
    }

    pub fn into_task(self) -> TaskAggregate {
        self.task
    }

    pub fn context(&self) -> &TaskRuntimeContext {
        &self.context
    }

    pub fn gauge(&self) -> &ProgressGauge {
        &self.gauge
    }

    pub fn completed_stage_count(&self) -> usize {
        self.gauge.completed()
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat
            .as_ref()
            .is_some_and(HeartbeatScheduler::is_running)
    }

    /// Ask the run to pause at the next stage boundary.
    pub fn request_pause(&self) {
        self.context.request_pause();
    }

    /// Ask the run to cancel at the next stage boundary.
    pub fn request_cancel(&self, cancelled_by: Option<String>) {
        self.context.request_cancel(cancelled_by);
    }

    /// Run the task from PENDING, PAUSED or an in-process RUNNING state until
    /// it completes, fails, pauses or is cancelled.
    pub async fn execute(&mut self) -> DomainResult<TaskExecutionResult> {
        let tenant_id = self.task.tenant_id().to_string();
        let task_id = self.task.task_id().to_string();

        if !self.deps.conflicts.try_acquire(&tenant_id, &task_id) {
            let running_task_id = self.deps.conflicts.holder(&tenant_id).unwrap_or_default();
            tracing::warn!(
                task_id = %task_id,
                tenant_id = %tenant_id,
                running_task_id = %running_task_id,
                "tenant already has an active run"
            );
            return Err(DomainError::TenantConflict {
                tenant_id,
                running_task_id,
            });
        }

        let span = tracing::info_span!(
            "task_run",
            task_id = %task_id,
            tenant_id = %tenant_id,
            correlation_id = %self.context.correlation_id(),
        );
        let result = self.execute_inner().instrument(span).await;

        self.stop_heartbeat();
        self.deps.conflicts.release(&tenant_id, &task_id);
        result
    }

    /// Retry a FAILED task, optionally continuing after its checkpoint.
    ///
    /// Without a checkpoint (in the aggregate or the repository) a checkpoint
    /// retry degrades to a full retry.
    pub async fn retry(&mut self, from_checkpoint: bool) -> DomainResult<TaskExecutionResult> {
        let global_max = self.settings.global_max_retry;
        if self.task.status() != TaskStatus::Failed {
            return Err(DomainError::invalid_transition(self.task.status(), "retry"));
        }
        let policy = self.task.retry_policy();
        if !policy.can_retry(global_max) {
            return Err(DomainError::RetryLimitExceeded {
                retry_count: policy.retry_count(),
                max_retry: policy.effective_max(global_max).unwrap_or_default(),
            });
        }

        let mut from_checkpoint = from_checkpoint;
        if from_checkpoint {
            let checkpoint = match self.task.checkpoint().cloned() {
                Some(checkpoint) => Some(checkpoint),
                None => self.deps.checkpoints.get(self.task.task_id()).await?,
            };
            match checkpoint {
                Some(checkpoint) => self.task.prepare_retry_range(checkpoint)?,
                None => {
                    tracing::info!(
                        task_id = %self.task.task_id(),
                        "no checkpoint recorded, retrying from the first stage"
                    );
                    from_checkpoint = false;
                }
            }
        }

        self.task.retry(from_checkpoint, global_max)?;
        if !from_checkpoint {
            self.deps.checkpoints.remove(self.task.task_id()).await?;
        }
        self.gauge.set_completed(self.task.current_stage_index());
        tracing::info!(
            task_id = %self.task.task_id(),
            retry_count = self.task.retry_policy().retry_count(),
            from_checkpoint,
            range = ?self.task.execution_range().map(ToString::to_string),
            "retrying task"
        );
        self.flush().await?;
        self.execute().await
    }

    /// Resume a PAUSED task.
    pub async fn resume(&mut self) -> DomainResult<TaskExecutionResult> {
        if self.task.status() != TaskStatus::Paused {
            return Err(DomainError::invalid_transition(self.task.status(), "resume"));
        }
        self.execute().await
    }

    async fn execute_inner(&mut self) -> DomainResult<TaskExecutionResult> {
        let started = Instant::now();
        match self.task.status() {
            TaskStatus::Pending => self.task.start()?,
            TaskStatus::Paused => self.task.resume()?,
            TaskStatus::Running => {}
            other => return Err(DomainError::invalid_transition(other, "execute")),
        }
        self.flush().await?;
        self.start_heartbeat();

        match self.run_stages().await {
            Ok((outcome, log)) => Ok(self.result(outcome, log, started)),
            Err(err) if err.kind() == ErrorType::System => {
                self.abort(&err).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn run_stages(&mut self) -> DomainResult<(RunOutcome, RunLog)> {
        let total = self.stages.len();
        let range = self
            .task
            .execution_range()
            .copied()
            .unwrap_or_else(|| ExecutionRange::full(total));
        // Progress is ahead of the range start when a paused run resumes.
        let start = self.task.current_stage_index().max(range.start_index());
        let end = range.effective_end_index(total);
        let mut log = RunLog::default();

        tracing::info!(
            start_index = start,
            end_index = end,
            total_stages = total,
            rollback = self.task.is_rollback_intent(),
            "running stages"
        );

        for index in start..end {
            let stage = Arc::clone(&self.stages[index]);
            let name = stage.name().to_string();

            if stage.can_skip(&self.context).await {
                tracing::info!(stage = %name, index, "stage skipped");
                self.task.skip_stage(&name)?;
                self.persist_checkpoint(index).await?;
                self.flush().await?;
                log.skipped.push(name);
            } else {
                self.task.start_stage(&name, stage.total_steps())?;
                self.flush().await?;
                tracing::info!(stage = %name, index, "stage started");

                let stage_started = Instant::now();
                let outcome = AssertUnwindSafe(stage.execute(&self.context))
                    .catch_unwind()
                    .await;
                let duration_ms = elapsed_ms(stage_started);

                match outcome {
                    Ok(Ok(())) => {
                        tracing::info!(stage = %name, index, duration_ms, "stage completed");
                        self.task.complete_stage(&name, duration_ms)?;
                        self.persist_checkpoint(index).await?;
                        self.flush().await?;
                        log.executed.push(name);
                    }
                    Ok(Err(err)) => {
                        let failure = err.into_failure(&name);
                        return self.fail_run(&name, index, failure, log).await;
                    }
                    Err(panic) => {
                        let failure = FailureInfo::system(format!(
                            "stage panicked: {}",
                            panic_message(panic.as_ref())
                        ))
                        .at_stage(name.as_str());
                        return self.fail_run(&name, index, failure, log).await;
                    }
                }
            }

            if range.is_last_in_range(index, total) {
                self.discard_late_control_requests();
            } else if let Some(outcome) = self.apply_control_requests().await? {
                return Ok((outcome, log));
            }
        }

        self.task.complete()?;
        self.task.clear_checkpoint();
        self.deps.checkpoints.remove(self.task.task_id()).await?;
        self.flush().await?;
        tracing::info!(
            executed = log.executed.len(),
            skipped = log.skipped.len(),
            "task completed"
        );
        Ok((RunOutcome::Completed, log))
    }

    async fn fail_run(
        &mut self,
        name: &str,
        index: usize,
        failure: FailureInfo,
        log: RunLog,
    ) -> DomainResult<(RunOutcome, RunLog)> {
        tracing::error!(
            stage = %name,
            index,
            error_type = %failure.error_type,
            retriable = failure.retriable,
            error = %failure.message,
            "stage failed"
        );
        self.task.fail_stage(name, failure.clone())?;
        self.task.fail(failure);
        self.flush().await?;
        Ok((RunOutcome::Failed, log))
    }

    /// Honour cancel, then pause. Returns the outcome if the run must stop.
    async fn apply_control_requests(&mut self) -> DomainResult<Option<RunOutcome>> {
        if self.context.is_cancel_requested() {
            let cancelled_by = self.context.cancel_requested_by();
            self.task.cancel(cancelled_by)?;
            self.context.clear_cancel();
            self.context.clear_pause();
            self.flush().await?;
            tracing::info!(
                next_stage_index = self.task.current_stage_index(),
                "task cancelled at stage boundary"
            );
            return Ok(Some(RunOutcome::Cancelled));
        }

        if self.context.is_pause_requested() {
            self.task.request_pause()?;
            self.context.clear_pause();
        }
        if self.task.apply_pause_at_stage_boundary() {
            self.flush().await?;
            tracing::info!(
                next_stage_index = self.task.current_stage_index(),
                "task paused at stage boundary"
            );
            return Ok(Some(RunOutcome::Paused));
        }
        Ok(None)
    }

    /// No boundary is left after the final in-range stage, so pending
    /// requests are dropped and the run completes.
    fn discard_late_control_requests(&self) {
        let cancel = self.context.is_cancel_requested();
        let pause = self.context.is_pause_requested();
        if cancel || pause {
            tracing::info!(
                cancel,
                pause,
                "control request after final stage ignored; task will complete"
            );
            self.context.clear_cancel();
            self.context.clear_pause();
        }
    }

    /// Record and persist the checkpoint for the stage at `index`.
    async fn persist_checkpoint(&mut self, index: usize) -> DomainResult<()> {
        let completed = self.task.completed_stage_names();
        let checkpoint = self.task.record_checkpoint(completed, index)?;
        self.deps
            .checkpoints
            .put(self.task.task_id(), &checkpoint)
            .await?;
        self.gauge.set_completed(self.task.current_stage_index());
        tracing::debug!(index, "checkpoint saved");
        Ok(())
    }

    /// Persist the aggregate, then publish its buffered events.
    async fn flush(&mut self) -> DomainResult<()> {
        self.deps.tasks.save(&self.task).await?;
        let events = self.task.drain_events();
        if events.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.deps.publisher.publish(events).await {
            tracing::warn!(task_id = %self.task.task_id(), error = %e, "event publish failed");
        }
        Ok(())
    }

    /// Fail the task after an infrastructure error. Best effort.
    async fn abort(&mut self, err: &DomainError) {
        tracing::error!(error = %err, "run aborted by infrastructure failure");
        self.task.fail(FailureInfo::from(err));
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "could not persist aborted task");
        }
    }

    fn start_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.start();
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.stop();
        }
    }

    fn result(&self, outcome: RunOutcome, log: RunLog, started: Instant) -> TaskExecutionResult {
        TaskExecutionResult {
            task_id: self.task.task_id().to_string(),
            outcome,
            final_status: self.task.status(),
            executed_stages: log.executed,
            skipped_stages: log.skipped,
            failure: (outcome == RunOutcome::Failed)
                .then(|| self.task.last_failure().cloned())
                .flatten(),
            duration_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
