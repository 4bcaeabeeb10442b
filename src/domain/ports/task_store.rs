use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{NewStep, StepRecord, Task, TaskUpdate};
use crate::domain::ports::errors::StoreError;

/// Result of an idempotent task creation.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The task was persisted; the caller owns enqueueing it.
    Created(Task),
    /// The idempotency key already belonged to this task; nothing was written.
    Existing(Task),
}

impl CreateOutcome {
    pub fn task(&self) -> &Task {
        match self {
            Self::Created(task) | Self::Existing(task) => task,
        }
    }

    pub fn into_task(self) -> Task {
        match self {
            Self::Created(task) | Self::Existing(task) => task,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Repository port for task persistence.
///
/// Implementations must make `create_or_get_task` atomic across the whole
/// idempotency mapping, and must number appended steps gap-free per task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist `task`, or return the task already registered under its
    /// idempotency key (in which case `task` is discarded).
    async fn create_or_get_task(&self, task: Task) -> Result<CreateOutcome, StoreError>;

    /// Get a task by ID, steps included
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Apply a partial update and refresh `updated_at`.
    ///
    /// Fails with `TaskNotFound` if the task does not exist and with
    /// `InvalidStateTransition` if the status change would move backwards.
    async fn update_task_fields(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError>;

    /// Append a step, assigning `step_no = len(steps) + 1`.
    async fn append_step(&self, id: Uuid, step: NewStep) -> Result<StepRecord, StoreError>;

    /// Steps of a task in execution order
    async fn get_steps(&self, id: Uuid) -> Result<Vec<StepRecord>, StoreError>;
}
