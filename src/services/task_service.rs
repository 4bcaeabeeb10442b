use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};
use crate::domain::ports::{CreateOutcome, QueueError, StoreError, TaskQueue, TaskStore};
use crate::services::metrics::{Counter, Metrics};

/// Longest goal accepted, in characters
pub const MAX_GOAL_CHARS: usize = 10_000;

/// Longest idempotency key accepted, in characters
pub const MAX_IDEMPOTENCY_KEY_CHARS: usize = 200;

/// Errors returned when submitting a task
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Entry point used by the API layer to create and look up tasks.
///
/// Creation goes through the store's idempotent insert. Any task that comes
/// back still `queued` is enqueued, which recovers a keyed task whose first
/// enqueue failed; the queue ignores ids that are already waiting, so a
/// repeated idempotency key never produces a second queue entry.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    metrics: Arc<Metrics>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<dyn TaskQueue>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            queue,
            metrics,
        }
    }

    /// Validate a goal and optional idempotency key.
    pub fn validate(goal: &str, idempotency_key: Option<&str>) -> Result<(), SubmitError> {
        let goal_len = goal.chars().count();
        if goal_len == 0 || goal_len > MAX_GOAL_CHARS {
            return Err(SubmitError::ValidationFailed(format!(
                "goal must be between 1 and {MAX_GOAL_CHARS} characters (got {goal_len})"
            )));
        }
        if let Some(key) = idempotency_key {
            let key_len = key.chars().count();
            if key_len > MAX_IDEMPOTENCY_KEY_CHARS {
                return Err(SubmitError::ValidationFailed(format!(
                    "idempotency_key must be at most {MAX_IDEMPOTENCY_KEY_CHARS} characters (got {key_len})"
                )));
            }
        }
        Ok(())
    }

    /// Create a task for `goal`, or return the task already registered under
    /// `idempotency_key`.
    #[instrument(skip(self, goal), fields(idempotency_key = ?idempotency_key), err)]
    pub async fn submit(
        &self,
        goal: String,
        idempotency_key: Option<String>,
    ) -> Result<CreateOutcome, SubmitError> {
        Self::validate(&goal, idempotency_key.as_deref())?;

        let outcome = self
            .store
            .create_or_get_task(Task::new(goal, idempotency_key))
            .await?;

        if let CreateOutcome::Created(task) = &outcome {
            self.metrics.inc(Counter::TaskCreated);
            info!(task_id = %task.task_id, "Task created");
        }

        let task = outcome.task();
        if task.status == TaskStatus::Queued {
            self.queue.enqueue(task.task_id).await?;
            debug!(task_id = %task.task_id, "Task enqueued");
        } else {
            debug!(
                task_id = %task.task_id,
                status = %task.status,
                "Idempotency key matched a task already picked up, not enqueueing"
            );
        }

        Ok(outcome)
    }

    /// Get a task with its steps
    pub async fn get(&self, task_id: Uuid) -> Result<Option<Task>, StoreError> {
        self.store.get_task(task_id).await
    }
}
