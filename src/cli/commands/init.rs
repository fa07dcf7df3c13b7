use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, StorageBackend};
use crate::infrastructure::config::{ConfigLoader, CONFIG_DIR};
use crate::infrastructure::setup::{open_storage, write_default_config};

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub config_path: PathBuf,
    pub database_path: Option<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Wrote {}", self.config_path.display())];
        if let Some(db) = &self.database_path {
            lines.push(format!("Initialized database at {db}"));
        }
        lines.join("\n")
    }
}

pub async fn execute(force: bool, json: bool) -> Result<()> {
    let out = init_in(Path::new(CONFIG_DIR), force).await?;
    output(&out, json);
    Ok(())
}

async fn init_in(dir: &Path, force: bool) -> Result<InitOutput> {
    let config_path = write_default_config(dir, force)?;
    let config: Config = ConfigLoader::load_from_file(&config_path)?;
    open_storage(&config).await?;
    tracing::info!(path = %config_path.display(), "project initialized");
    Ok(InitOutput {
        config_path,
        database_path: (config.storage == StorageBackend::Sqlite).then(|| config.database.path),
    })
}
