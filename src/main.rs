//! Switchover CLI entry point.

use anyhow::Result;
use clap::Parser;

use switchover::cli::{self, Cli, Commands};
use switchover::infrastructure::logging::LoggerImpl;
use switchover::infrastructure::setup::open_storage;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli::load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&config.logging)?;

    match cli.command {
        Commands::Init { force } => cli::commands::init::execute(force, cli.json).await,
        Commands::Config(command) => cli::commands::config::execute(command, config, cli.json),
        Commands::Task(command) => {
            let storage = open_storage(&config).await?;
            cli::commands::task::execute(command, &storage, cli.json).await
        }
        Commands::Checkpoint(command) => {
            let storage = open_storage(&config).await?;
            cli::commands::checkpoint::execute(command, &storage, cli.json).await
        }
    }
}
