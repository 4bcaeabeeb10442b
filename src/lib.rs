//! LLM Task Runner - goal-to-plan task execution engine
//!
//! Accepts natural-language goals, turns each into a short plan of tool
//! invocations, and executes the plan under bounded concurrency with retries,
//! per-step deadlines and an append-only step audit trail.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): task and step models, the execution failure
//!   taxonomy, and the port traits
//! - **Service Layer** (`services`): retry policy, metrics, task submission
//! - **Application Layer** (`application`): the per-task pipeline and the
//!   dispatch loop
//! - **Infrastructure Layer** (`infrastructure`): stores, queues, planners,
//!   tools, HTTP API, configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use llm_task_runner::infrastructure::setup::Components;
//! use llm_task_runner::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let components = Components::build(&config).await?;
//!     let mut worker = components.worker(&config);
//!     worker.start()?;
//!     components.task_service().submit("calculate: 2+2".into(), None).await?;
//!     worker.stop().await
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{ExecutionSettings, TaskExecutor, Worker, WorkerSettings};
pub use domain::models::{
    Config, NewStep, PlannedStep, StepKind, StepRecord, Task, TaskStatus, TaskUpdate, ToolName,
};
pub use domain::ports::{Planner, TaskQueue, TaskStore, Tool};
pub use domain::ExecutionError;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Counter, Metrics, RetryPolicy, TaskService};
