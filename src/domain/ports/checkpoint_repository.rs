//! Checkpoint repository port.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskCheckpoint;

/// Durable single-slot checkpoint storage, keyed by task id.
///
/// `put` replaces any existing checkpoint (last write wins).
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn put(&self, task_id: &str, checkpoint: &TaskCheckpoint) -> DomainResult<()>;

    async fn get(&self, task_id: &str) -> DomainResult<Option<TaskCheckpoint>>;

    async fn remove(&self, task_id: &str) -> DomainResult<()>;

    async fn put_batch(&self, checkpoints: &[(String, TaskCheckpoint)]) -> DomainResult<()> {
        for (task_id, checkpoint) in checkpoints {
            self.put(task_id, checkpoint).await?;
        }
        Ok(())
    }

    /// Checkpoints found among `task_ids`; missing ids are omitted.
    async fn get_batch(&self, task_ids: &[String]) -> DomainResult<HashMap<String, TaskCheckpoint>> {
        let mut found = HashMap::new();
        for task_id in task_ids {
            if let Some(checkpoint) = self.get(task_id).await? {
                found.insert(task_id.clone(), checkpoint);
            }
        }
        Ok(found)
    }

    async fn remove_batch(&self, task_ids: &[String]) -> DomainResult<()> {
        for task_id in task_ids {
            self.remove(task_id).await?;
        }
        Ok(())
    }
}
