//! Connection pool for the task store.
//!
//! The store is either a file on disk (WAL journal, parent directories
//! created on first open) or a private in-memory database used by tests.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

/// Writers wait this long on a locked task store before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot open task store {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("task store path must not be empty")]
    EmptyPath,
    #[error("cannot create task store directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("task store did not answer: {0}")]
    Unreachable(#[source] sqlx::Error),
}

/// Where the task store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    /// `database.path` from the configuration; `:memory:` selects an
    /// in-memory store.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        match config.path.trim() {
            "" => Err(ConnectionError::EmptyPath),
            ":memory:" => Ok(Self::Memory),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions, ConnectionError> {
        match self {
            Self::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map(|options| options.journal_mode(SqliteJournalMode::Memory))
                .map_err(|source| ConnectionError::Open {
                    location: self.to_string(),
                    source,
                }),
            Self::File(path) => {
                create_parent_directory(path)?;
                Ok(SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .busy_timeout(BUSY_TIMEOUT))
            }
        }
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str(":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            ..Self::default()
        }
    }
}

/// Open a pool over the task store at `location`.
///
/// An in-memory store is private to one connection, so its pool is capped
/// at a single connection regardless of `pool`.
pub async fn create_pool(
    location: &StoreLocation,
    pool: &PoolConfig,
) -> Result<SqlitePool, ConnectionError> {
    let max_connections = match location {
        StoreLocation::Memory => 1,
        StoreLocation::File(_) => pool.max_connections,
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(pool.min_connections.min(max_connections))
        .acquire_timeout(pool.acquire_timeout)
        .connect_with(location.connect_options()?)
        .await
        .map_err(|source| ConnectionError::Open {
            location: location.to_string(),
            source,
        })?;

    tracing::debug!(%location, max_connections, "task store pool opened");
    Ok(pool)
}

/// Fresh in-memory task store, empty on every call.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    create_pool(&StoreLocation::Memory, &PoolConfig::default()).await
}

fn create_parent_directory(path: &Path) -> Result<(), ConnectionError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(|source| ConnectionError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Round-trip a trivial query to confirm the store answers.
pub async fn verify_connection(pool: &SqlitePool) -> Result<(), ConnectionError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(ConnectionError::Unreachable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: &str) -> DatabaseConfig {
        DatabaseConfig {
            path: path.to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_location_from_config() {
        assert_eq!(StoreLocation::from_config(&config(":memory:")).unwrap(), StoreLocation::Memory);
        assert_eq!(
            StoreLocation::from_config(&config(".switchover/tasks.db")).unwrap(),
            StoreLocation::File(PathBuf::from(".switchover/tasks.db"))
        );
        assert!(matches!(
            StoreLocation::from_config(&config("  ")),
            Err(ConnectionError::EmptyPath)
        ));
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("switchover.db");
        let location = StoreLocation::File(db_path.clone());

        let pool = create_pool(&location, &PoolConfig::default()).await.unwrap();
        verify_connection(&pool).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_memory_store_keeps_rows_across_queries() {
        let pool = create_test_pool().await.unwrap();
        sqlx::query("CREATE TABLE stage_marks (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO stage_marks VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stage_marks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
