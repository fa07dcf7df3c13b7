//! Common test utilities for integration tests
//!
//! Scripted stages, a recording publisher and in-memory wiring shared by
//! the executor, service and storage tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use switchover::adapters::memory::{
    InMemoryCheckpointRepository, InMemoryConflictRegistry, InMemoryTaskRepository,
    InMemoryTaskRuntimeRepository,
};
use switchover::domain::models::{
    TargetVersion, TaskAggregate, TaskDomainEvent, TaskIdentity, TaskRuntimeContext,
};
use switchover::domain::ports::{
    stage_names, CheckpointRepository, DomainEventPublisher, Stage, StageError, StageFactory,
    TaskRepository,
};
use switchover::domain::{DomainError, DomainResult};
use switchover::services::{ExecutorDeps, RunSettings, TaskExecutor, TaskService};

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.db");
    (dir, db_path)
}

/// Setup test logging
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// What a [`ScriptedStage`] does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Skip,
    /// Fail on the first execution, succeed afterwards.
    FailOnce,
    /// Succeed and request a pause at the next boundary.
    SucceedThenPause,
    /// Succeed and request cancellation at the next boundary.
    SucceedThenCancel,
    /// Sleep before succeeding.
    Slow(u64),
}

/// Stage whose outcome is fixed at construction. Counts its executions.
pub struct ScriptedStage {
    name: String,
    behavior: Behavior,
    runs: Arc<AtomicUsize>,
}

impl ScriptedStage {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn can_skip(&self, _ctx: &TaskRuntimeContext) -> bool {
        self.behavior == Behavior::Skip
    }

    async fn execute(&self, ctx: &TaskRuntimeContext) -> Result<(), StageError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed | Behavior::Skip => Ok(()),
            Behavior::Fail => Err(StageError::system(format!("{} failed", self.name))),
            Behavior::Panic => panic!("{} panicked", self.name),
            Behavior::FailOnce if run == 0 => Err(StageError::system("transient")),
            Behavior::FailOnce => Ok(()),
            Behavior::SucceedThenPause => {
                ctx.request_pause();
                Ok(())
            }
            Behavior::SucceedThenCancel => {
                ctx.request_cancel(Some("operator".into()));
                Ok(())
            }
            Behavior::Slow(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        }
    }
}

/// Build stages from `(name, behavior)` pairs, keeping handles for run counts.
pub fn scripted(specs: &[(&str, Behavior)]) -> (Vec<Arc<dyn Stage>>, Vec<Arc<ScriptedStage>>) {
    let handles: Vec<Arc<ScriptedStage>> = specs
        .iter()
        .map(|(name, behavior)| Arc::new(ScriptedStage::new(name, *behavior)))
        .collect();
    let stages = handles
        .iter()
        .map(|s| Arc::clone(s) as Arc<dyn Stage>)
        .collect();
    (stages, handles)
}

/// Publisher that keeps every event it receives.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<TaskDomainEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<TaskDomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Event kinds, excluding heartbeats.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events()
            .iter()
            .map(TaskDomainEvent::kind)
            .filter(|k| *k != "TaskProgress")
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl DomainEventPublisher for RecordingPublisher {
    async fn publish(&self, events: Vec<TaskDomainEvent>) -> DomainResult<()> {
        self.events
            .lock()
            .map_err(|e| DomainError::SystemError(e.to_string()))?
            .extend(events);
        Ok(())
    }
}

/// Publisher that always fails.
pub struct FailingPublisher;

#[async_trait]
impl DomainEventPublisher for FailingPublisher {
    async fn publish(&self, _events: Vec<TaskDomainEvent>) -> DomainResult<()> {
        Err(DomainError::SystemError("sink unavailable".into()))
    }
}

/// In-memory collaborators with typed handles kept for assertions.
pub struct World {
    pub tasks: Arc<InMemoryTaskRepository>,
    pub checkpoints: Arc<InMemoryCheckpointRepository>,
    pub conflicts: Arc<InMemoryConflictRegistry>,
    pub publisher: Arc<RecordingPublisher>,
}

impl World {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(InMemoryTaskRepository::new()),
            checkpoints: Arc::new(InMemoryCheckpointRepository::new()),
            conflicts: Arc::new(InMemoryConflictRegistry::new()),
            publisher: Arc::new(RecordingPublisher::default()),
        }
    }

    pub fn deps(&self) -> ExecutorDeps {
        ExecutorDeps {
            checkpoints: self.checkpoints.clone() as Arc<dyn CheckpointRepository>,
            tasks: self.tasks.clone() as Arc<dyn TaskRepository>,
            publisher: self.publisher.clone(),
            conflicts: self.conflicts.clone(),
        }
    }

    /// Pending task with `stages` attached, wrapped in an executor.
    pub fn executor(&self, task_id: &str, stages: Vec<Arc<dyn Stage>>) -> TaskExecutor {
        self.executor_with(task_id, "tenant-a", stages, RunSettings::default())
    }

    pub fn executor_with(
        &self,
        task_id: &str,
        tenant_id: &str,
        stages: Vec<Arc<dyn Stage>>,
        settings: RunSettings,
    ) -> TaskExecutor {
        let task = pending_task(task_id, tenant_id, &stages);
        let context = TaskRuntimeContext::new(task.identity().clone());
        TaskExecutor::new(task, stages, context, self.deps(), settings)
            .expect("executor construction")
    }

    pub fn service(&self, factory: Arc<dyn StageFactory>) -> TaskService {
        TaskService::new(
            self.deps(),
            Arc::new(InMemoryTaskRuntimeRepository::new()),
            factory,
        )
    }
}

pub fn pending_task(task_id: &str, tenant_id: &str, stages: &[Arc<dyn Stage>]) -> TaskAggregate {
    let mut task = TaskAggregate::new(
        TaskIdentity::new(task_id, "plan-1", tenant_id),
        TargetVersion::new("v2"),
    )
    .with_previous_version(TargetVersion::new("v1"));
    task.set_total_stages(stage_names(stages))
        .expect("attach stages");
    task.mark_as_pending().expect("mark pending");
    task
}

/// Factory reading stage specs from `version.config["stages"]`.
///
/// Each entry is a stage name; the prefix picks the behavior:
/// `fail-`, `panic-`, `skip-`, `flaky-`, `slow-`, anything else succeeds.
/// Stages are shared per name so `flaky-` keeps its state across runs.
#[derive(Default)]
pub struct ScriptedFactory {
    built: Mutex<std::collections::HashMap<String, Arc<ScriptedStage>>>,
}

impl ScriptedFactory {
    pub fn stage(&self, name: &str) -> Option<Arc<ScriptedStage>> {
        self.built.lock().ok()?.get(name).cloned()
    }
}

impl StageFactory for ScriptedFactory {
    fn build_stages(
        &self,
        _task: &TaskAggregate,
        version: &TargetVersion,
    ) -> DomainResult<Vec<Arc<dyn Stage>>> {
        let names = version.config["stages"]
            .as_array()
            .ok_or_else(|| DomainError::ValidationFailed("version has no stages".into()))?;
        let mut built = self
            .built
            .lock()
            .map_err(|e| DomainError::SystemError(e.to_string()))?;
        Ok(names
            .iter()
            .filter_map(|n| n.as_str())
            .map(|name| {
                let stage = built.entry(name.to_string()).or_insert_with(|| {
                    let behavior = match name.split('-').next() {
                        Some("fail") => Behavior::Fail,
                        Some("panic") => Behavior::Panic,
                        Some("skip") => Behavior::Skip,
                        Some("flaky") => Behavior::FailOnce,
                        Some("slow") => Behavior::Slow(200),
                        _ => Behavior::Succeed,
                    };
                    Arc::new(ScriptedStage::new(name, behavior))
                });
                Arc::clone(stage) as Arc<dyn Stage>
            })
            .collect())
    }
}

pub fn version(name: &str, stages: &[&str]) -> TargetVersion {
    TargetVersion::new(name).with_config(serde_json::json!({ "stages": stages }))
}
