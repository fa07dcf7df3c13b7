//! CLI command implementations.

pub mod checkpoint;
pub mod config;
pub mod init;
pub mod task;

use anyhow::{bail, Result};

use crate::domain::models::TaskAggregate;
use crate::domain::ports::TaskRepository;

/// Resolve a full task id or a unique prefix of one.
pub async fn resolve_task(tasks: &dyn TaskRepository, id_or_prefix: &str) -> Result<TaskAggregate> {
    if let Some(task) = tasks.get(id_or_prefix).await? {
        return Ok(task);
    }
    let mut matches: Vec<_> = tasks
        .list()
        .await?
        .into_iter()
        .filter(|t| t.task_id().starts_with(id_or_prefix))
        .collect();
    match matches.len() {
        0 => bail!("Task {id_or_prefix} not found. Use 'switchover task list' to see available tasks."),
        1 => Ok(matches.remove(0)),
        n => bail!("Task id prefix {id_or_prefix} is ambiguous ({n} matches)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTaskRepository;
    use crate::domain::models::{TargetVersion, TaskIdentity};

    async fn repo_with(ids: &[&str]) -> InMemoryTaskRepository {
        let repo = InMemoryTaskRepository::new();
        for id in ids {
            let task = TaskAggregate::new(
                TaskIdentity::new(*id, "plan-1", "tenant-a"),
                TargetVersion::new("v2"),
            );
            repo.save(&task).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_resolve_exact_and_prefix() {
        let repo = repo_with(&["abc-123", "abd-456"]).await;
        assert_eq!(resolve_task(&repo, "abc-123").await.unwrap().task_id(), "abc-123");
        assert_eq!(resolve_task(&repo, "abd").await.unwrap().task_id(), "abd-456");
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_or_missing() {
        let repo = repo_with(&["abc-123", "abd-456"]).await;
        let ambiguous = resolve_task(&repo, "ab").await.unwrap_err();
        assert!(ambiguous.to_string().contains("ambiguous"));
        assert!(resolve_task(&repo, "zzz").await.is_err());
    }
}
