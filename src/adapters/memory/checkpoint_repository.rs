use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskCheckpoint;
use crate::domain::ports::CheckpointRepository;

/// Single-slot checkpoint map. Batch operations take the lock once.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointRepository {
    checkpoints: RwLock<HashMap<String, TaskCheckpoint>>,
}

impl InMemoryCheckpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointRepository for InMemoryCheckpointRepository {
    async fn put(&self, task_id: &str, checkpoint: &TaskCheckpoint) -> DomainResult<()> {
        self.checkpoints
            .write()
            .await
            .insert(task_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> DomainResult<Option<TaskCheckpoint>> {
        Ok(self.checkpoints.read().await.get(task_id).cloned())
    }

    async fn remove(&self, task_id: &str) -> DomainResult<()> {
        self.checkpoints.write().await.remove(task_id);
        Ok(())
    }

    async fn put_batch(&self, checkpoints: &[(String, TaskCheckpoint)]) -> DomainResult<()> {
        let mut map = self.checkpoints.write().await;
        for (task_id, checkpoint) in checkpoints {
            map.insert(task_id.clone(), checkpoint.clone());
        }
        Ok(())
    }

    async fn get_batch(&self, task_ids: &[String]) -> DomainResult<HashMap<String, TaskCheckpoint>> {
        let map = self.checkpoints.read().await;
        Ok(task_ids
            .iter()
            .filter_map(|id| map.get(id).map(|cp| (id.clone(), cp.clone())))
            .collect())
    }

    async fn remove_batch(&self, task_ids: &[String]) -> DomainResult<()> {
        let mut map = self.checkpoints.write().await;
        for task_id in task_ids {
            map.remove(task_id);
        }
        Ok(())
    }
}
