//! Project initialization and storage wiring
//!
//! - Writes the default `.switchover/config.yaml`
//! - Opens the configured storage backend and applies migrations

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::memory::{InMemoryCheckpointRepository, InMemoryTaskRepository};
use crate::adapters::sqlite::{initialize_database, SqliteCheckpointRepository, SqliteTaskRepository};
use crate::domain::models::{Config, StorageBackend};
use crate::domain::ports::{CheckpointRepository, TaskRepository};

/// Default configuration template content
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Switchover Configuration
# Override settings by editing this file, adding .switchover/local.yaml,
# or setting environment variables with the SWITCHOVER_ prefix
#
# Example environment variables:
#   export SWITCHOVER_RETRY__GLOBAL_MAX_RETRY=5
#   export SWITCHOVER_DATABASE__PATH=/custom/path/switchover.db
#   export SWITCHOVER_LOGGING__LEVEL=debug

executor:
  # Seconds between progress heartbeats while a task runs
  heartbeat_interval_secs: 10
  heartbeat_enabled: true

retry:
  # Retry cap for tasks without their own; null for unbounded
  global_max_retry: 3

# Persistence backend: sqlite or memory
storage: sqlite

database:
  path: ".switchover/switchover.db"
  max_connections: 5

logging:
  # Log level: trace, debug, info, warn, error
  level: "info"
  # Console format: json, pretty
  format: "json"
  # Rolling file rotation: daily, hourly, never
  rotation: "daily"
  retention_days: 30
"#;

/// Write the default config into `dir`. Existing files are kept unless `force`.
///
/// Returns the path of the config file.
pub fn write_default_config(dir: &Path, force: bool) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("config.yaml");
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Persistence ports backed by the configured storage.
#[derive(Clone)]
pub struct Storage {
    pub tasks: Arc<dyn TaskRepository>,
    pub checkpoints: Arc<dyn CheckpointRepository>,
}

/// Open the configured backend, creating and migrating the SQLite file if needed.
pub async fn open_storage(config: &Config) -> Result<Storage> {
    match config.storage {
        StorageBackend::Memory => Ok(Storage {
            tasks: Arc::new(InMemoryTaskRepository::new()),
            checkpoints: Arc::new(InMemoryCheckpointRepository::new()),
        }),
        StorageBackend::Sqlite => {
            let pool = initialize_database(&config.database)
                .await
                .with_context(|| format!("failed to open database {}", config.database.path))?;
            Ok(Storage {
                tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
                checkpoints: Arc::new(SqliteCheckpointRepository::new(pool)),
            })
        }
    }
}
