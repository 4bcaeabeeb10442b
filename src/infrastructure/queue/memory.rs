use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use uuid::Uuid;

use crate::domain::ports::{QueueError, TaskQueue};

/// Unbounded in-process FIFO.
///
/// Enqueue never blocks. The receiver sits behind a mutex so several callers
/// can wait on it; each id is handed to exactly one of them. An id that is
/// already waiting is not pushed a second time.
pub struct InMemoryTaskQueue {
    tx: mpsc::UnboundedSender<Uuid>,
    rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
    pending: StdMutex<HashSet<Uuid>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: StdMutex::new(HashSet::new()),
        }
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task_id: Uuid) -> Result<(), QueueError> {
        let mut pending = self.pending.lock().map_err(|_| QueueError::Closed)?;
        if !pending.insert(task_id) {
            return Ok(());
        }
        if self.tx.send(task_id).is_err() {
            pending.remove(&task_id);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    async fn dequeue_blocking(&self, wait: Duration) -> Result<Option<Uuid>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        let mut rx = match tokio::time::timeout_at(deadline, self.rx.lock()).await {
            Ok(rx) => rx,
            Err(_) => return Ok(None),
        };

        match timeout(deadline.saturating_duration_since(tokio::time::Instant::now()), rx.recv()).await {
            Ok(Some(id)) => {
                self.pending.lock().map_err(|_| QueueError::Closed)?.remove(&id);
                Ok(Some(id))
            }
            // The sender lives as long as the queue, so this is unreachable in practice.
            Ok(None) => Err(QueueError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.rx.lock().await.len())
    }
}
