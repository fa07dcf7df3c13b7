use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::Cell;
use serde::Serialize;

use super::resolve_task;
use crate::cli::output::{format_timestamp, output, truncate, CommandOutput};
use crate::cli::table::{list_table, render_list, status_cell};
use crate::cli::TaskCommands;
use crate::domain::models::{TaskAggregate, TaskStatus};
use crate::infrastructure::setup::Storage;

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub tenant_id: String,
    pub plan_id: String,
    pub version: String,
    pub status: TaskStatus,
    pub completed_stages: usize,
    pub total_stages: usize,
    pub retry_count: u32,
    pub rolling_back: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&TaskAggregate> for TaskSummary {
    fn from(task: &TaskAggregate) -> Self {
        Self {
            task_id: task.task_id().to_string(),
            tenant_id: task.tenant_id().to_string(),
            plan_id: task.plan_id().to_string(),
            version: task.target_version().version.clone(),
            status: task.status(),
            completed_stages: task.current_stage_index(),
            total_stages: task.total_stages(),
            retry_count: task.retry_policy().retry_count(),
            rolling_back: task.is_rollback_intent(),
            created_at: task.time_range().created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskSummary>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&[
            "id", "tenant", "version", "status", "progress", "retries", "created",
        ]);
        for task in &self.tasks {
            let version = if task.rolling_back {
                format!("{} (rollback)", task.version)
            } else {
                task.version.clone()
            };
            table.add_row(vec![
                Cell::new(truncate(&task.task_id, 11)),
                Cell::new(&task.tenant_id),
                Cell::new(version),
                status_cell(task.status),
                Cell::new(format!("{}/{}", task.completed_stages, task.total_stages)),
                Cell::new(task.retry_count),
                Cell::new(format_timestamp(&task.created_at)),
            ]);
        }
        render_list("task", &table, self.tasks.len())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct TaskDetailOutput {
    pub task: TaskAggregate,
}

impl CommandOutput for TaskDetailOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            "Task Details:".to_string(),
            format!("  ID: {}", task.task_id()),
            format!("  Tenant: {}", task.tenant_id()),
            format!("  Plan: {}", task.plan_id()),
            format!("  Status: {}", task.status()),
            format!("  Target version: {}", task.target_version().version),
        ];
        if let Some(previous) = task.previous_version() {
            lines.push(format!("  Previous version: {}", previous.version));
        }
        if task.is_rollback_intent() {
            lines.push("  Rolling back: yes".to_string());
        }
        if let Some(range) = task.execution_range() {
            lines.push(format!("  Execution range: {range}"));
        }
        let policy = task.retry_policy();
        lines.push(match policy.max_retry() {
            Some(max) => format!("  Retries: {} of {max}", policy.retry_count()),
            None => format!("  Retries: {} (global cap)", policy.retry_count()),
        });

        let times = task.time_range();
        lines.push(format!("  Created at: {}", format_timestamp(&times.created_at)));
        if let Some(started) = &times.started_at {
            lines.push(format!("  Started at: {}", format_timestamp(started)));
        }
        if let Some(ended) = &times.ended_at {
            lines.push(format!("  Ended at: {}", format_timestamp(ended)));
        }
        lines.push(format!("  Duration: {}", task.duration()));
        if let Some(by) = task.cancelled_by() {
            lines.push(format!("  Cancelled by: {by}"));
        }

        if !task.stage_names().is_empty() {
            lines.push("  Stages:".to_string());
            let current = task.current_stage_index();
            for (index, name) in task.stage_names().iter().enumerate() {
                let marker = match index.cmp(&current) {
                    std::cmp::Ordering::Less => "[x]",
                    std::cmp::Ordering::Equal if task.status() == TaskStatus::Running => "[>]",
                    _ => "[ ]",
                };
                lines.push(format!("    {marker} {index}: {name}"));
            }
        }
        if let Some(failure) = task.last_failure() {
            lines.push(format!("  Last failure: {failure}"));
        }
        if let Some(checkpoint) = task.checkpoint() {
            lines.push(format!(
                "  Checkpoint: after stage {} ({})",
                checkpoint.last_completed_stage_index,
                checkpoint.last_completed_stage_name().unwrap_or("-")
            ));
        }
        lines.join("\n")
    }
}

pub async fn execute(command: TaskCommands, storage: &Storage, json: bool) -> Result<()> {
    match command {
        TaskCommands::List { tenant, status } => handle_list(storage, tenant, status, json).await,
        TaskCommands::Show { task_id } => handle_show(storage, &task_id, json).await,
    }
}

async fn handle_list(
    storage: &Storage,
    tenant: Option<String>,
    status: Option<String>,
    json: bool,
) -> Result<()> {
    let status = status
        .map(|s| {
            TaskStatus::from_str(&s)
                .with_context(|| format!("Unknown task status '{s}'"))
        })
        .transpose()?;

    let tasks = match (&tenant, status) {
        (Some(tenant), _) => storage.tasks.find_by_tenant(tenant).await,
        (None, Some(status)) => storage.tasks.find_by_status(status).await,
        (None, None) => storage.tasks.list().await,
    }
    .context("Failed to list tasks")?;

    let tasks = tasks
        .iter()
        .filter(|t| status.is_none_or(|s| t.status() == s))
        .map(TaskSummary::from)
        .collect();
    output(&TaskListOutput { tasks }, json);
    Ok(())
}

async fn handle_show(storage: &Storage, task_id: &str, json: bool) -> Result<()> {
    let task = resolve_task(storage.tasks.as_ref(), task_id).await?;
    output(&TaskDetailOutput { task }, json);
    Ok(())
}
