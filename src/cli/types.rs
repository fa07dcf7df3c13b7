//! CLI type definitions
//!
//! Clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switchover")]
#[command(about = "Switchover - resumable multi-stage deployment tasks", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .switchover/
    #[arg(short, long, global = true, env = "SWITCHOVER_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default configuration and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect persisted tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Inspect or clear recovery checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),

    /// Show or validate the effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List tasks, most recent first
    List {
        /// Only tasks of this tenant
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only tasks in this status (e.g. RUNNING, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show details for a task (full id or unique prefix)
    Show { task_id: String },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Show the checkpoint of a task
    Show { task_id: String },

    /// Delete the checkpoint of a task; a later retry starts from the first stage
    Clear { task_id: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Load and validate the configuration
    Validate,
}
