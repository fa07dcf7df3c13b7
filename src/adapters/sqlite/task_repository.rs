//! SQLite implementation of the TaskRepository.
//!
//! The aggregate is stored as one JSON document; tenant and status are
//! duplicated into indexed columns for lookups.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskAggregate, TaskStatus};
use crate::domain::ports::TaskRepository;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, value: &str) -> DomainResult<Vec<TaskAggregate>> {
        let sql = format!("SELECT payload FROM tasks WHERE {clause} = ? ORDER BY created_at DESC");
        let rows: Vec<TaskRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TaskAggregate::try_from).collect()
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn save(&self, task: &TaskAggregate) -> DomainResult<()> {
        let payload = serde_json::to_string(task)?;
        sqlx::query(
            r#"INSERT INTO tasks (id, plan_id, tenant_id, status, payload, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   status = excluded.status,
                   payload = excluded.payload,
                   updated_at = excluded.updated_at"#,
        )
        .bind(task.task_id())
        .bind(task.plan_id())
        .bind(task.tenant_id())
        .bind(task.status().as_str())
        .bind(&payload)
        .bind(task.time_range().created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> DomainResult<Option<TaskAggregate>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT payload FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskAggregate::try_from).transpose()
    }

    async fn remove(&self, task_id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_tenant(&self, tenant_id: &str) -> DomainResult<Vec<TaskAggregate>> {
        self.fetch_where("tenant_id", tenant_id).await
    }

    async fn find_by_status(&self, status: TaskStatus) -> DomainResult<Vec<TaskAggregate>> {
        self.fetch_where("status", status.as_str()).await
    }

    async fn list(&self) -> DomainResult<Vec<TaskAggregate>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT payload FROM tasks ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TaskAggregate::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    payload: String,
}

impl TryFrom<TaskRow> for TaskAggregate {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_str(&row.payload)?)
    }
}
