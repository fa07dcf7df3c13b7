//! SQLite implementation of the CheckpointRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskCheckpoint;
use crate::domain::ports::CheckpointRepository;

const UPSERT_CHECKPOINT: &str = r#"INSERT INTO task_checkpoints
       (task_id, last_completed_stage_index, payload, updated_at)
       VALUES (?, ?, ?, ?)
       ON CONFLICT(task_id) DO UPDATE SET
           last_completed_stage_index = excluded.last_completed_stage_index,
           payload = excluded.payload,
           updated_at = excluded.updated_at"#;

#[derive(Clone)]
pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn stage_index(checkpoint: &TaskCheckpoint) -> i64 {
    i64::try_from(checkpoint.last_completed_stage_index).unwrap_or(i64::MAX)
}

#[async_trait]
impl CheckpointRepository for SqliteCheckpointRepository {
    async fn put(&self, task_id: &str, checkpoint: &TaskCheckpoint) -> DomainResult<()> {
        sqlx::query(UPSERT_CHECKPOINT)
            .bind(task_id)
            .bind(stage_index(checkpoint))
            .bind(serde_json::to_string(checkpoint)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> DomainResult<Option<TaskCheckpoint>> {
        let row: Option<CheckpointRow> =
            sqlx::query_as("SELECT task_id, payload FROM task_checkpoints WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|r| r.decode().map(|(_, cp)| cp)).transpose()
    }

    async fn remove(&self, task_id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM task_checkpoints WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_batch(&self, checkpoints: &[(String, TaskCheckpoint)]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        for (task_id, checkpoint) in checkpoints {
            sqlx::query(UPSERT_CHECKPOINT)
                .bind(task_id)
                .bind(stage_index(checkpoint))
                .bind(serde_json::to_string(checkpoint)?)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_batch(&self, task_ids: &[String]) -> DomainResult<HashMap<String, TaskCheckpoint>> {
        if task_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT task_id, payload FROM task_checkpoints WHERE task_id IN (",
        );
        let mut ids = query.separated(", ");
        for task_id in task_ids {
            ids.push_bind(task_id);
        }
        ids.push_unseparated(")");

        let rows: Vec<CheckpointRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(CheckpointRow::decode).collect()
    }

    async fn remove_batch(&self, task_ids: &[String]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        for task_id in task_ids {
            sqlx::query("DELETE FROM task_checkpoints WHERE task_id = ?")
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    task_id: String,
    payload: String,
}

impl CheckpointRow {
    fn decode(self) -> Result<(String, TaskCheckpoint), DomainError> {
        let checkpoint = serde_json::from_str(&self.payload)?;
        Ok((self.task_id, checkpoint))
    }
}
