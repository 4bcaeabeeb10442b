use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::ports::errors::QueueError;

/// FIFO handoff of task identifiers from the API layer to the worker.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Push a task id without blocking.
    ///
    /// Pushing an id that is still waiting is a no-op, so callers may
    /// re-enqueue a task whose earlier push they are unsure about.
    async fn enqueue(&self, task_id: Uuid) -> Result<(), QueueError>;

    /// Wait up to `timeout` for the next id.
    ///
    /// `Ok(None)` means the wait expired with nothing to hand off; callers
    /// use it to re-check their shutdown signal.
    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, QueueError>;

    /// Number of ids waiting to be handed off.
    async fn len(&self) -> Result<usize, QueueError>;
}
