//! Versioned schema of the task store.
//!
//! Each [`Migration`] is one SQL script from `migrations/`, embedded at
//! compile time. Applied versions are recorded in `task_store_migrations`
//! together with their description, so a store opened by an older build
//! only receives the scripts it has not seen.

use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS task_store_migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("task store migration {version} ({description}) failed: {source}")]
    Apply {
        version: i64,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("cannot read task store schema version: {0}")]
    Ledger(#[source] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Scripts in version order.
pub fn all_embedded_migrations() -> &'static [Migration] {
    &[
        Migration {
            version: 1,
            description: "tasks table with tenant and status indexes",
            sql: include_str!("../../../migrations/001_tasks.sql"),
        },
        Migration {
            version: 2,
            description: "task_checkpoints table, one row per task",
            sql: include_str!("../../../migrations/002_task_checkpoints.sql"),
        },
    ]
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bring the store up to the newest of `migrations`. Returns how many
    /// scripts ran.
    pub async fn run_embedded_migrations(
        &self,
        migrations: &[Migration],
    ) -> Result<usize, MigrationError> {
        sqlx::query(LEDGER_DDL)
            .execute(&self.pool)
            .await
            .map_err(MigrationError::Ledger)?;
        let from = self.get_current_version().await?;

        let mut applied = 0;
        for migration in migrations.iter().filter(|m| m.version > from) {
            let fail = |source| MigrationError::Apply {
                version: migration.version,
                description: migration.description,
                source,
            };
            let mut tx = self.pool.begin().await.map_err(fail)?;
            record(&mut tx, migration).await.map_err(fail)?;
            tx.commit().await.map_err(fail)?;
            applied += 1;
        }

        if applied > 0 {
            tracing::info!(
                from_version = from,
                to_version = self.get_current_version().await?,
                applied,
                "task store schema upgraded"
            );
        }
        Ok(applied)
    }

    /// Highest recorded version; 0 for a fresh store.
    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM task_store_migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(MigrationError::Ledger)
    }
}

/// Run the script and add its ledger row inside `tx`.
async fn record(tx: &mut Transaction<'_, Sqlite>, migration: &Migration) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(migration.sql).execute(&mut **tx).await?;
    sqlx::query("INSERT INTO task_store_migrations (version, description) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.description)
        .execute(&mut **tx)
        .await?;
    tracing::debug!(version = migration.version, description = migration.description, "migration applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    #[tokio::test]
    async fn test_fresh_store_gets_both_tables_once() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool.clone());

        let applied = migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(migrator.get_current_version().await.unwrap(), 2);

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'task%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, ["task_checkpoints", "task_store_migrations", "tasks"]);

        let again = migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_store_at_version_one_only_gets_checkpoints() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool);

        migrator
            .run_embedded_migrations(&all_embedded_migrations()[..1])
            .await
            .unwrap();
        assert_eq!(migrator.get_current_version().await.unwrap(), 1);

        let applied = migrator
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(migrator.get_current_version().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_script_leaves_version_unchanged() {
        let pool = create_test_pool().await.unwrap();
        let migrator = Migrator::new(pool);
        let broken = [Migration {
            version: 1,
            description: "broken",
            sql: "CREATE TABLE tasks (",
        }];

        let err = migrator.run_embedded_migrations(&broken).await.unwrap_err();
        assert!(matches!(err, MigrationError::Apply { version: 1, .. }));
        assert_eq!(migrator.get_current_version().await.unwrap(), 0);
    }
}
