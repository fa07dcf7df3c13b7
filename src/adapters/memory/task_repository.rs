use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskAggregate, TaskStatus};
use crate::domain::ports::TaskRepository;

#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, TaskAggregate>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect<F>(&self, filter: F) -> Vec<TaskAggregate>
    where
        F: Fn(&TaskAggregate) -> bool,
    {
        let tasks = self.tasks.read().await;
        let mut found: Vec<_> = tasks.values().filter(|t| filter(t)).cloned().collect();
        found.sort_by(|a, b| b.time_range().created_at.cmp(&a.time_range().created_at));
        found
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &TaskAggregate) -> DomainResult<()> {
        // Stored copies never carry undelivered events.
        let mut stored = task.clone();
        stored.drain_events();
        self.tasks
            .write()
            .await
            .insert(task.task_id().to_string(), stored);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> DomainResult<Option<TaskAggregate>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn remove(&self, task_id: &str) -> DomainResult<()> {
        self.tasks.write().await.remove(task_id);
        Ok(())
    }

    async fn find_by_tenant(&self, tenant_id: &str) -> DomainResult<Vec<TaskAggregate>> {
        Ok(self.collect(|t| t.tenant_id() == tenant_id).await)
    }

    async fn find_by_status(&self, status: TaskStatus) -> DomainResult<Vec<TaskAggregate>> {
        Ok(self.collect(|t| t.status() == status).await)
    }

    async fn list(&self) -> DomainResult<Vec<TaskAggregate>> {
        Ok(self.collect(|_| true).await)
    }
}
