//! Task repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskAggregate, TaskStatus};

/// Persistence for task aggregates.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert or replace a task.
    async fn save(&self, task: &TaskAggregate) -> DomainResult<()>;

    async fn get(&self, task_id: &str) -> DomainResult<Option<TaskAggregate>>;

    async fn remove(&self, task_id: &str) -> DomainResult<()>;

    async fn find_by_tenant(&self, tenant_id: &str) -> DomainResult<Vec<TaskAggregate>>;

    async fn find_by_status(&self, status: TaskStatus) -> DomainResult<Vec<TaskAggregate>>;

    /// All tasks, most recently created first.
    async fn list(&self) -> DomainResult<Vec<TaskAggregate>>;
}
