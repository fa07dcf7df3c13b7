//! Retention cleanup for rolling log files.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

use super::logger::LOG_FILE_NAME;

/// Delete log files in `log_dir` last modified more than `retention_days` ago.
///
/// Only files produced by the rolling appender (`switchover.log*`) are
/// considered. Returns the number of files deleted.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }
    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut deleted = 0;

    for entry in std::fs::read_dir(log_dir).context("failed to read log directory")? {
        let path = entry.context("failed to read directory entry")?.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_NAME));
        if !is_log || !path.is_file() {
            continue;
        }

        let modified: DateTime<Utc> = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .context("failed to get file modification time")?
            .into();
        if modified < cutoff {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to delete {}", path.display()))?;
            deleted += 1;
        }
    }
    Ok(deleted)
}
