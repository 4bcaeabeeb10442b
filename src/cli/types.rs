//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "llm-task-runner")]
#[command(about = "Goal-to-plan task runner", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./llm-task-runner.yaml if present)
    #[arg(short, long, global = true, env = "LLM_TASK_RUNNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API and the worker until Ctrl-C
    Serve,

    /// Execute one goal in-process and print the finished task
    Run {
        /// Natural-language goal, e.g. "calculate: 2+2"
        goal: String,

        /// Idempotency key attached to the task
        #[arg(short = 'k', long)]
        idempotency_key: Option<String>,
    },

    /// Print the effective configuration
    Config,
}
