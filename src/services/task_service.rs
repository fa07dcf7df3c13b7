//! Task lifecycle service.
//!
//! Entry point for embedding applications: creates tasks, spawns executor
//! runs on their own tokio tasks and routes pause/cancel/retry/rollback
//! requests to the right place (the live run's context, or the persisted
//! aggregate when nothing is running).

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    FailureInfo, TargetVersion, TaskAggregate, TaskExecutionResult, TaskIdentity,
    TaskRuntimeContext, TaskStatus,
};
use crate::domain::ports::{
    stage_names, Stage, StageFactory, TaskRuntime, TaskRuntimeRepository,
};
use crate::services::task_executor::{ExecutorDeps, RunSettings, TaskExecutor};

#[derive(Debug, Clone, Copy)]
enum RunKind {
    Execute,
    Retry { from_checkpoint: bool },
}

pub struct TaskService {
    deps: ExecutorDeps,
    runtimes: Arc<dyn TaskRuntimeRepository>,
    factory: Arc<dyn StageFactory>,
    settings: RunSettings,
}

impl TaskService {
    pub fn new(
        deps: ExecutorDeps,
        runtimes: Arc<dyn TaskRuntimeRepository>,
        factory: Arc<dyn StageFactory>,
    ) -> Self {
        Self {
            deps,
            runtimes,
            factory,
            settings: RunSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    /// Create a task for `tenant_id`, attach its stages and mark it PENDING.
    pub async fn create_task(
        &self,
        plan_id: &str,
        tenant_id: &str,
        target: TargetVersion,
        previous: Option<TargetVersion>,
    ) -> DomainResult<TaskAggregate> {
        if tenant_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed("tenant id cannot be empty".into()));
        }
        let identity = TaskIdentity::new(Uuid::new_v4().to_string(), plan_id, tenant_id);
        let mut task = TaskAggregate::new(identity, target.clone());
        if let Some(previous) = previous {
            task = task.with_previous_version(previous);
        }

        let stages = self.factory.build_stages(&task, &target)?;
        task.set_total_stages(stage_names(&stages))?;
        task.mark_as_pending()?;
        self.persist(&mut task).await?;

        tracing::info!(
            task_id = %task.task_id(),
            tenant_id = %task.tenant_id(),
            version = %target.version,
            stages = task.total_stages(),
            "task created"
        );
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> DomainResult<TaskAggregate> {
        self.deps
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))
    }

    pub async fn list_tasks(&self) -> DomainResult<Vec<TaskAggregate>> {
        self.deps.tasks.list().await
    }

    pub async fn tasks_for_tenant(&self, tenant_id: &str) -> DomainResult<Vec<TaskAggregate>> {
        self.deps.tasks.find_by_tenant(tenant_id).await
    }

    pub async fn is_running(&self, task_id: &str) -> DomainResult<bool> {
        self.runtimes.is_running(task_id).await
    }

    /// Spawn a run for a PENDING task.
    pub async fn start_task(&self, task_id: &str) -> DomainResult<()> {
        let task = self.get_task(task_id).await?;
        if task.status() != TaskStatus::Pending {
            return Err(DomainError::invalid_transition(task.status(), "start"));
        }
        self.spawn(task, RunKind::Execute).await
    }

    /// Ask a running task to pause after its current stage.
    pub async fn pause_task(&self, task_id: &str) -> DomainResult<()> {
        match self.live_context(task_id).await? {
            Some(context) => {
                context.request_pause();
                tracing::info!(task_id, "pause requested");
                Ok(())
            }
            None => {
                let task = self.get_task(task_id).await?;
                Err(DomainError::invalid_transition(task.status(), "pause"))
            }
        }
    }

    /// Cancel a task.
    ///
    /// A running task stops at its next stage boundary; any other
    /// non-terminal task is cancelled immediately.
    pub async fn cancel_task(&self, task_id: &str, cancelled_by: Option<String>) -> DomainResult<()> {
        if let Some(context) = self.live_context(task_id).await? {
            context.request_cancel(cancelled_by);
            tracing::info!(task_id, "cancel requested");
            return Ok(());
        }

        let mut task = self.get_task(task_id).await?;
        task.cancel(cancelled_by)?;
        self.persist(&mut task).await?;
        tracing::info!(task_id, "task cancelled");
        Ok(())
    }

    /// Spawn a run continuing a PAUSED task.
    pub async fn resume_task(&self, task_id: &str) -> DomainResult<()> {
        let task = self.get_task(task_id).await?;
        if task.status() != TaskStatus::Paused {
            return Err(DomainError::invalid_transition(task.status(), "resume"));
        }
        self.spawn(task, RunKind::Execute).await
    }

    /// Spawn a retry run for a FAILED task.
    ///
    /// The retry cap is checked before anything is spawned. A failed
    /// rollback is retried as a rollback.
    pub async fn retry_task(&self, task_id: &str, from_checkpoint: bool) -> DomainResult<()> {
        let task = self.get_task(task_id).await?;
        if task.status() != TaskStatus::Failed {
            return Err(DomainError::invalid_transition(task.status(), "retry"));
        }
        let global_max = self.settings.global_max_retry;
        let policy = task.retry_policy();
        if !policy.can_retry(global_max) {
            return Err(DomainError::RetryLimitExceeded {
                retry_count: policy.retry_count(),
                max_retry: policy.effective_max(global_max).unwrap_or_default(),
            });
        }
        self.spawn(task, RunKind::Retry { from_checkpoint }).await
    }

    /// Replay the previous version's stages over the range the failed run
    /// touched, then spawn the run.
    pub async fn rollback_task(&self, task_id: &str) -> DomainResult<()> {
        let mut task = self.get_task(task_id).await?;
        if task.status() != TaskStatus::Failed {
            return Err(DomainError::invalid_transition(task.status(), "roll back"));
        }
        if task.is_rollback_intent() {
            return Err(DomainError::RollbackUnavailable(format!(
                "task {task_id} is already rolling back; retry it instead"
            )));
        }
        let previous = task.previous_version().cloned().ok_or_else(|| {
            DomainError::RollbackUnavailable(format!("task {task_id} has no previous version"))
        })?;

        if task.checkpoint().is_none() {
            if let Some(checkpoint) = self.deps.checkpoints.get(task_id).await? {
                task.restore_from_checkpoint(checkpoint)?;
            }
        }
        let stages = self.factory.build_stages(&task, &previous)?;
        task.set_total_stages(stage_names(&stages))?;
        task.prepare_rollback_range()?;
        // The forward run's checkpoint indexes the other version's stages.
        task.clear_checkpoint();
        task.begin_rollback()?;
        self.deps.checkpoints.remove(task_id).await?;
        self.persist(&mut task).await?;

        tracing::info!(
            task_id,
            version = %previous.version,
            range = ?task.execution_range().map(ToString::to_string),
            "rollback prepared"
        );
        self.spawn_with(task, stages, RunKind::Execute).await
    }

    /// Reconcile a task left RUNNING or PAUSED by a process that died.
    ///
    /// The task is failed as interrupted with its persisted checkpoint
    /// restored, so a checkpoint retry continues after the last durable stage.
    /// Tasks with a live run, or in any other state, are returned unchanged.
    pub async fn recover_task(&self, task_id: &str) -> DomainResult<TaskAggregate> {
        let mut task = self.get_task(task_id).await?;
        if !matches!(task.status(), TaskStatus::Running | TaskStatus::Paused)
            || self.runtimes.is_running(task_id).await?
        {
            return Ok(task);
        }

        if let Some(checkpoint) = self.deps.checkpoints.get(task_id).await? {
            task.restore_from_checkpoint(checkpoint)?;
        }
        task.fail(FailureInfo::system("interrupted: no live run after restart"));
        self.persist(&mut task).await?;
        self.runtimes.remove(task_id).await?;
        self.deps.conflicts.release(task.tenant_id(), task_id);

        tracing::warn!(
            task_id,
            next_stage_index = task.current_stage_index(),
            "recovered interrupted task"
        );
        Ok(task)
    }

    /// Recover every interrupted task. Returns the ids touched.
    pub async fn recover_all(&self) -> DomainResult<Vec<String>> {
        let mut candidates = self.deps.tasks.find_by_status(TaskStatus::Running).await?;
        candidates.extend(self.deps.tasks.find_by_status(TaskStatus::Paused).await?);

        let mut recovered = Vec::new();
        for task in candidates {
            let after = self.recover_task(task.task_id()).await?;
            if after.status() == TaskStatus::Failed {
                recovered.push(after.task_id().to_string());
            }
        }
        Ok(recovered)
    }

    /// Await the run spawned most recently for `task_id`.
    pub async fn wait_for(&self, task_id: &str) -> DomainResult<TaskExecutionResult> {
        let handle = self.runtimes.take_handle(task_id).await?.ok_or_else(|| {
            DomainError::ValidationFailed(format!("task {task_id} has no run to wait for"))
        })?;
        handle
            .await
            .map_err(|e| DomainError::SystemError(format!("run of task {task_id} aborted: {e}")))?
    }

    async fn spawn(&self, task: TaskAggregate, kind: RunKind) -> DomainResult<()> {
        let version = if task.is_rollback_intent() {
            task.previous_version().cloned().ok_or_else(|| {
                DomainError::RollbackUnavailable(format!(
                    "task {} has no previous version",
                    task.task_id()
                ))
            })?
        } else {
            task.target_version().clone()
        };
        let stages = self.factory.build_stages(&task, &version)?;
        self.spawn_with(task, stages, kind).await
    }

    async fn spawn_with(
        &self,
        task: TaskAggregate,
        stages: Vec<Arc<dyn Stage>>,
        kind: RunKind,
    ) -> DomainResult<()> {
        let task_id = task.task_id().to_string();
        if self.runtimes.is_running(&task_id).await? {
            return Err(DomainError::ValidationFailed(format!(
                "task {task_id} already has a run in flight"
            )));
        }
        if let Some(holder) = self.deps.conflicts.holder(task.tenant_id()) {
            if holder != task_id {
                return Err(DomainError::TenantConflict {
                    tenant_id: task.tenant_id().to_string(),
                    running_task_id: holder,
                });
            }
        }

        let context = TaskRuntimeContext::new(task.identity().clone());
        let mut executor = TaskExecutor::new(
            task,
            stages.clone(),
            context.clone(),
            self.deps.clone(),
            self.settings,
        )?;
        let runtime = TaskRuntime::new(context, stages);
        let running = runtime.mark_running();
        self.runtimes.put(&task_id, runtime).await?;

        let handle = tokio::spawn(async move {
            let _running = running;
            match kind {
                RunKind::Execute => executor.execute().await,
                RunKind::Retry { from_checkpoint } => executor.retry(from_checkpoint).await,
            }
        });
        self.runtimes.set_handle(&task_id, handle).await?;
        tracing::debug!(task_id = %task_id, ?kind, "run spawned");
        Ok(())
    }

    async fn live_context(&self, task_id: &str) -> DomainResult<Option<TaskRuntimeContext>> {
        if !self.runtimes.is_running(task_id).await? {
            return Ok(None);
        }
        self.runtimes.context(task_id).await
    }

    /// Save the aggregate, then publish its buffered events.
    async fn persist(&self, task: &mut TaskAggregate) -> DomainResult<()> {
        self.deps.tasks.save(task).await?;
        let events = task.drain_events();
        if !events.is_empty() {
            if let Err(e) = self.deps.publisher.publish(events).await {
                tracing::warn!(task_id = %task.task_id(), error = %e, "event publish failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryCheckpointRepository, InMemoryConflictRegistry, InMemoryTaskRepository,
        InMemoryTaskRuntimeRepository,
    };
    use crate::domain::models::RunOutcome;
    use crate::domain::ports::{CheckpointRepository, ConflictRegistry, StageError};
    use crate::services::event_bus::EventBus;
    use async_trait::async_trait;

    struct NamedStage(String);

    #[async_trait]
    impl Stage for NamedStage {
        fn name(&self) -> &str {
            &self.0
        }

        async fn execute(&self, _ctx: &TaskRuntimeContext) -> Result<(), StageError> {
            if self.0.starts_with("fail") {
                Err(StageError::business("rejected"))
            } else {
                Ok(())
            }
        }
    }

    /// Stage names come from the version's config: `{"stages": ["a", "b"]}`.
    struct ConfigFactory;

    impl StageFactory for ConfigFactory {
        fn build_stages(
            &self,
            _task: &TaskAggregate,
            version: &TargetVersion,
        ) -> DomainResult<Vec<Arc<dyn Stage>>> {
            let names = version.config["stages"]
                .as_array()
                .ok_or_else(|| DomainError::ValidationFailed("no stages".into()))?;
            Ok(names
                .iter()
                .filter_map(|n| n.as_str())
                .map(|n| Arc::new(NamedStage(n.to_string())) as Arc<dyn Stage>)
                .collect())
        }
    }

    fn version(name: &str, stages: &[&str]) -> TargetVersion {
        TargetVersion::new(name).with_config(serde_json::json!({ "stages": stages }))
    }

    struct Fixture {
        service: TaskService,
        checkpoints: Arc<InMemoryCheckpointRepository>,
        conflicts: Arc<InMemoryConflictRegistry>,
    }

    fn fixture() -> Fixture {
        let checkpoints = Arc::new(InMemoryCheckpointRepository::new());
        let conflicts = Arc::new(InMemoryConflictRegistry::new());
        let deps = ExecutorDeps {
            checkpoints: checkpoints.clone(),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            publisher: Arc::new(EventBus::default()),
            conflicts: conflicts.clone(),
        };
        let service = TaskService::new(
            deps,
            Arc::new(InMemoryTaskRuntimeRepository::new()),
            Arc::new(ConfigFactory),
        );
        Fixture {
            service,
            checkpoints,
            conflicts,
        }
    }

    #[tokio::test]
    async fn test_create_and_run_to_completion() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["a", "b"]), None)
            .await
            .unwrap();
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.total_stages(), 2);

        f.service.start_task(task.task_id()).await.unwrap();
        let result = f.service.wait_for(task.task_id()).await.unwrap();
        assert_eq!(result.outcome, RunOutcome::Completed);

        let stored = f.service.get_task(task.task_id()).await.unwrap();
        assert_eq!(stored.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_requires_pending() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["a"]), None)
            .await
            .unwrap();
        f.service.start_task(task.task_id()).await.unwrap();
        f.service.wait_for(task.task_id()).await.unwrap();

        let err = f.service.start_task(task.task_id()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_without_live_run_is_immediate() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["a"]), None)
            .await
            .unwrap();
        f.service
            .cancel_task(task.task_id(), Some("ops".into()))
            .await
            .unwrap();

        let stored = f.service.get_task(task.task_id()).await.unwrap();
        assert_eq!(stored.status(), TaskStatus::Cancelled);
        assert_eq!(stored.cancelled_by(), Some("ops"));
    }

    #[tokio::test]
    async fn test_pause_without_live_run_is_rejected() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["a"]), None)
            .await
            .unwrap();
        let err = f.service.pause_task(task.task_id()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_rollback_replays_previous_version() {
        let f = fixture();
        let task = f
            .service
            .create_task(
                "plan-1",
                "tenant-a",
                version("v2", &["a", "fail-b", "c"]),
                Some(version("v1", &["a", "b", "c"])),
            )
            .await
            .unwrap();
        let id = task.task_id().to_string();
        f.service.start_task(&id).await.unwrap();
        assert_eq!(
            f.service.wait_for(&id).await.unwrap().outcome,
            RunOutcome::Failed
        );

        f.service.rollback_task(&id).await.unwrap();
        let result = f.service.wait_for(&id).await.unwrap();
        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.executed_stages, vec!["a", "b"]);

        let stored = f.service.get_task(&id).await.unwrap();
        assert!(!stored.is_rollback_intent());
        assert_eq!(stored.retry_policy().retry_count(), 0);
    }

    #[tokio::test]
    async fn test_rollback_without_previous_version() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["fail-a"]), None)
            .await
            .unwrap();
        f.service.start_task(task.task_id()).await.unwrap();
        f.service.wait_for(task.task_id()).await.unwrap();

        let err = f.service.rollback_task(task.task_id()).await.unwrap_err();
        assert!(matches!(err, DomainError::RollbackUnavailable(_)));
    }

    #[tokio::test]
    async fn test_retry_cap_checked_before_spawn() {
        let f = fixture();
        let service = f.service.with_settings(RunSettings {
            heartbeat_interval: None,
            global_max_retry: Some(1),
        });
        let task = service
            .create_task("plan-1", "tenant-a", version("v2", &["fail-a"]), None)
            .await
            .unwrap();
        let id = task.task_id().to_string();
        service.start_task(&id).await.unwrap();
        service.wait_for(&id).await.unwrap();

        service.retry_task(&id, false).await.unwrap();
        service.wait_for(&id).await.unwrap();

        let err = service.retry_task(&id, false).await.unwrap_err();
        assert!(matches!(err, DomainError::RetryLimitExceeded { retry_count: 1, max_retry: 1 }));
    }

    #[tokio::test]
    async fn test_recover_fails_orphaned_running_task() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["a", "b", "c"]), None)
            .await
            .unwrap();
        let id = task.task_id().to_string();

        // Simulate a process that died after completing stage 0.
        let mut orphan = task.clone();
        orphan.start().unwrap();
        orphan.start_stage("a", 1).unwrap();
        orphan.complete_stage("a", 5).unwrap();
        let checkpoint = orphan.record_checkpoint(vec!["a".into()], 0).unwrap();
        f.checkpoints.put(&id, &checkpoint).await.unwrap();
        f.service.deps.tasks.save(&orphan).await.unwrap();
        f.conflicts.try_acquire("tenant-a", &id);

        let recovered = f.service.recover_task(&id).await.unwrap();
        assert_eq!(recovered.status(), TaskStatus::Failed);
        assert_eq!(recovered.current_stage_index(), 1);
        assert!(f.conflicts.holder("tenant-a").is_none());

        f.service.retry_task(&id, true).await.unwrap();
        let result = f.service.wait_for(&id).await.unwrap();
        assert_eq!(result.executed_stages, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_tenant_conflict_on_start() {
        let f = fixture();
        let task = f
            .service
            .create_task("plan-1", "tenant-a", version("v2", &["a"]), None)
            .await
            .unwrap();
        f.conflicts.try_acquire("tenant-a", "someone-else");

        let err = f.service.start_task(task.task_id()).await.unwrap_err();
        assert!(matches!(err, DomainError::TenantConflict { .. }));
    }
}
