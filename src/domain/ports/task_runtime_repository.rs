//! Task runtime repository port.
//!
//! Holds the artifacts of a live run that need not survive a restart:
//! the attached stage list, the control context and the run's join handle.
//! Liveness is tracked apart from the handle so a caller awaiting the
//! handle does not make the run look finished.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::stage::Stage;
use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskExecutionResult, TaskRuntimeContext};

/// Join handle of a spawned executor run.
pub type ExecutionHandle = JoinHandle<DomainResult<TaskExecutionResult>>;

/// Transient runtime state of one task.
pub struct TaskRuntime {
    pub context: TaskRuntimeContext,
    pub stages: Vec<Arc<dyn Stage>>,
    pub handle: Option<ExecutionHandle>,
    running: Arc<AtomicBool>,
}

impl TaskRuntime {
    pub fn new(context: TaskRuntimeContext, stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            context,
            stages,
            handle: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag the run as live until the returned guard is dropped.
    ///
    /// The guard belongs inside the spawned future, so it is released on
    /// completion, panic or abort.
    pub fn mark_running(&self) -> RunningGuard {
        self.running.store(true, Ordering::SeqCst);
        RunningGuard {
            running: Arc::clone(&self.running),
        }
    }

    /// A run was started and its future has not yet ended.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Clears the owning runtime's liveness flag on drop.
#[derive(Debug)]
pub struct RunningGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for TaskRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRuntime")
            .field("task_id", &self.context.task_id())
            .field("stages", &self.stages.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[async_trait]
pub trait TaskRuntimeRepository: Send + Sync {
    /// Register (or replace) the runtime of a task.
    async fn put(&self, task_id: &str, runtime: TaskRuntime) -> DomainResult<()>;

    async fn context(&self, task_id: &str) -> DomainResult<Option<TaskRuntimeContext>>;

    async fn stages(&self, task_id: &str) -> DomainResult<Option<Vec<Arc<dyn Stage>>>>;

    async fn set_handle(&self, task_id: &str, handle: ExecutionHandle) -> DomainResult<()>;

    /// Detach the run handle so the caller can await it. The runtime stays
    /// live until the run itself ends.
    async fn take_handle(&self, task_id: &str) -> DomainResult<Option<ExecutionHandle>>;

    async fn is_running(&self, task_id: &str) -> DomainResult<bool>;

    async fn remove(&self, task_id: &str) -> DomainResult<()>;
}
