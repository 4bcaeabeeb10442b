//! `run`: execute a single goal against the in-memory backend.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::cli::output::{create_spinner, output, TaskOutput};
use crate::domain::models::{Config, Task};
use crate::domain::ports::TaskStore;
use crate::infrastructure::queue::InMemoryTaskQueue;
use crate::infrastructure::setup::Components;
use crate::infrastructure::store::InMemoryTaskStore;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn execute(
    config: Config,
    goal: String,
    idempotency_key: Option<String>,
    json_mode: bool,
) -> Result<()> {
    let task = run_goal(&config, goal, idempotency_key).await?;
    output(&TaskOutput(task), json_mode);
    Ok(())
}

/// Submit `goal`, drive it through a private worker, and return the
/// finished task.
pub async fn run_goal(config: &Config, goal: String, idempotency_key: Option<String>) -> Result<Task> {
    let components = Components::with_backend(
        config,
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(InMemoryTaskQueue::new()),
    )?;
    let task_id = components
        .task_service()
        .submit(goal, idempotency_key)
        .await
        .context("Failed to submit task")?
        .task()
        .task_id;

    let mut worker = components.worker(config);
    worker.start()?;

    let spinner = create_spinner(format!("Running task {task_id}"));
    let finished = wait_for_terminal(components.store.as_ref(), task_id).await;
    spinner.finish_and_clear();

    worker.stop().await?;
    finished
}

async fn wait_for_terminal(store: &dyn TaskStore, task_id: Uuid) -> Result<Task> {
    loop {
        match store.get_task(task_id).await? {
            Some(task) if task.status.is_terminal() => return Ok(task),
            Some(_) => sleep(POLL_INTERVAL).await,
            None => bail!("task {task_id} disappeared from the store"),
        }
    }
}
