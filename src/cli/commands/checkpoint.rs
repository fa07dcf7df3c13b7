use anyhow::{Context, Result};
use serde::Serialize;

use super::resolve_task;
use crate::cli::output::{format_timestamp, output, CommandOutput};
use crate::cli::CheckpointCommands;
use crate::domain::models::{TaskCheckpoint, TaskStatus};
use crate::infrastructure::setup::Storage;

#[derive(Debug, Serialize)]
pub struct CheckpointOutput {
    pub task_id: String,
    pub checkpoint: Option<TaskCheckpoint>,
}

impl CommandOutput for CheckpointOutput {
    fn to_human(&self) -> String {
        let Some(cp) = &self.checkpoint else {
            return format!("No checkpoint recorded for task {}.", self.task_id);
        };
        let mut lines = vec![
            format!("Checkpoint for task {}:", self.task_id),
            format!(
                "  Last completed stage: {} ({})",
                cp.last_completed_stage_index,
                cp.last_completed_stage_name().unwrap_or("-")
            ),
            format!("  Next stage index: {}", cp.next_stage_index()),
            format!("  Completed: {}", cp.completed_stage_names.join(", ")),
            format!("  All stages: {}", cp.all_stage_names.join(", ")),
            format!("  Recorded at: {}", format_timestamp(&cp.timestamp)),
        ];
        if !cp.custom_data.is_empty() {
            let mut keys: Vec<_> = cp.custom_data.keys().map(String::as_str).collect();
            keys.sort_unstable();
            lines.push(format!("  Custom data: {}", keys.join(", ")));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CheckpointClearOutput {
    pub task_id: String,
    pub cleared: bool,
}

impl CommandOutput for CheckpointClearOutput {
    fn to_human(&self) -> String {
        if self.cleared {
            format!("Cleared checkpoint for task {}.", self.task_id)
        } else {
            format!("Task {} had no checkpoint.", self.task_id)
        }
    }
}

pub async fn execute(command: CheckpointCommands, storage: &Storage, json: bool) -> Result<()> {
    match command {
        CheckpointCommands::Show { task_id } => {
            let task = resolve_task(storage.tasks.as_ref(), &task_id).await?;
            let checkpoint = storage
                .checkpoints
                .get(task.task_id())
                .await
                .context("Failed to read checkpoint")?;
            output(
                &CheckpointOutput {
                    task_id: task.task_id().to_string(),
                    checkpoint,
                },
                json,
            );
            Ok(())
        }
        CheckpointCommands::Clear { task_id } => {
            let mut task = resolve_task(storage.tasks.as_ref(), &task_id).await?;
            if matches!(task.status(), TaskStatus::Running | TaskStatus::Paused) {
                anyhow::bail!(
                    "Task {} is {}; its checkpoint is still in use",
                    task.task_id(),
                    task.status()
                );
            }
            let existed = storage.checkpoints.get(task.task_id()).await?.is_some()
                || task.checkpoint().is_some();
            storage
                .checkpoints
                .remove(task.task_id())
                .await
                .context("Failed to remove checkpoint")?;
            if task.checkpoint().is_some() {
                task.clear_checkpoint();
                storage.tasks.save(&task).await?;
            }
            tracing::info!(task_id = %task.task_id(), "checkpoint cleared");
            output(
                &CheckpointClearOutput {
                    task_id: task.task_id().to_string(),
                    cleared: existed,
                },
                json,
            );
            Ok(())
        }
    }
}
