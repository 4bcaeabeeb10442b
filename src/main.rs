//! llm-task-runner CLI entry point.

use anyhow::Result;
use clap::Parser;

use llm_task_runner::cli::{self, commands, Cli, Commands};
use llm_task_runner::infrastructure::config::ConfigLoader;
use llm_task_runner::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = run(cli).await {
        cli::handle_error(err, json_mode);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::load(cli.config.as_deref())?;
    let log_config = LogConfig::try_from(&config.logging).map_err(anyhow::Error::msg)?;
    let _logger = LoggerImpl::init(&log_config)?;

    match cli.command {
        Commands::Serve => commands::serve::execute(config).await,
        Commands::Run {
            goal,
            idempotency_key,
        } => commands::run::execute(config, goal, idempotency_key, cli.json).await,
        Commands::Config => commands::config::execute(config, cli.json),
    }
}
