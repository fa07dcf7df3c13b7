//! SQLite persistence adapters.

pub mod checkpoint_repository;
pub mod connection;
pub mod migrations;
pub mod task_repository;

pub use checkpoint_repository::SqliteCheckpointRepository;
pub use connection::{
    create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig, StoreLocation,
};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use task_repository::SqliteTaskRepository;

use sqlx::SqlitePool;

use crate::domain::models::DatabaseConfig;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Open the configured task store and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let location = StoreLocation::from_config(config)?;
    let pool = create_pool(&location, &PoolConfig::from(config)).await?;
    verify_connection(&pool).await?;
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    tracing::info!(%location, "task store ready");
    Ok(pool)
}

/// In-memory task store with the full schema.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    Ok(pool)
}
