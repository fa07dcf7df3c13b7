use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskRuntimeContext;
use crate::domain::ports::{ExecutionHandle, Stage, TaskRuntime, TaskRuntimeRepository};

#[derive(Debug, Default)]
pub struct InMemoryTaskRuntimeRepository {
    runtimes: RwLock<HashMap<String, TaskRuntime>>,
}

impl InMemoryTaskRuntimeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRuntimeRepository for InMemoryTaskRuntimeRepository {
    async fn put(&self, task_id: &str, runtime: TaskRuntime) -> DomainResult<()> {
        let replaced = self
            .runtimes
            .write()
            .await
            .insert(task_id.to_string(), runtime);
        if replaced.is_some_and(|r| r.is_running()) {
            tracing::warn!(task_id, "replaced runtime of a run still in flight");
        }
        Ok(())
    }

    async fn context(&self, task_id: &str) -> DomainResult<Option<TaskRuntimeContext>> {
        Ok(self
            .runtimes
            .read()
            .await
            .get(task_id)
            .map(|r| r.context.clone()))
    }

    async fn stages(&self, task_id: &str) -> DomainResult<Option<Vec<Arc<dyn Stage>>>> {
        Ok(self
            .runtimes
            .read()
            .await
            .get(task_id)
            .map(|r| r.stages.clone()))
    }

    async fn set_handle(&self, task_id: &str, handle: ExecutionHandle) -> DomainResult<()> {
        let mut runtimes = self.runtimes.write().await;
        let runtime = runtimes
            .get_mut(task_id)
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;
        runtime.handle = Some(handle);
        Ok(())
    }

    async fn take_handle(&self, task_id: &str) -> DomainResult<Option<ExecutionHandle>> {
        Ok(self
            .runtimes
            .write()
            .await
            .get_mut(task_id)
            .and_then(|r| r.handle.take()))
    }

    async fn is_running(&self, task_id: &str) -> DomainResult<bool> {
        Ok(self
            .runtimes
            .read()
            .await
            .get(task_id)
            .is_some_and(TaskRuntime::is_running))
    }

    async fn remove(&self, task_id: &str) -> DomainResult<()> {
        self.runtimes.write().await.remove(task_id);
        Ok(())
    }
}
