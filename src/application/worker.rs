//! Bounded-concurrency dispatch loop.
//!
//! The worker drains task ids from the queue and runs one [`TaskExecutor`]
//! pipeline per id, never more than `max_concurrent_tasks` at a time.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ dispatch loop                                │
//! │   acquire permit ──► dequeue ──► spawn ──┐   │
//! │        ▲                                 │   │
//! │        └──────── permit dropped ◄────────┘   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A permit is taken *before* dequeuing so the backlog stays on the queue
//! instead of piling up inside the process. A store or queue failure ends
//! the loop and fires the shutdown signal.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::task_executor::TaskExecutor;
use crate::domain::models::Config;
use crate::domain::ports::{StoreError, TaskQueue};

/// Dispatch loop knobs.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_concurrent_tasks: usize,

    /// Longest single blocking wait on the queue
    pub queue_poll: Duration,

    /// Time in-flight pipelines get after shutdown before being aborted
    pub shutdown_grace: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_tasks: config.max_concurrent_tasks.max(1),
            queue_poll: config.queue_poll(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Running,
}

type PipelineResult = (Uuid, Result<(), StoreError>);

/// Owns the dispatch loop and its shutdown signal.
///
/// # Example
///
/// ```ignore
/// let mut worker = Worker::new(queue, executor, WorkerSettings::from_config(&config));
/// worker.start()?;
/// // ... serve requests ...
/// worker.stop().await?;
/// ```
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    executor: Arc<TaskExecutor>,
    settings: WorkerSettings,
    semaphore: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
    state: WorkerState,
    loop_handle: Option<JoinHandle<Result<()>>>,
}

impl Worker {
    pub fn new(queue: Arc<dyn TaskQueue>, executor: Arc<TaskExecutor>, settings: WorkerSettings) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            queue,
            executor,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_tasks)),
            settings,
            shutdown_tx,
            state: WorkerState::Stopped,
            loop_handle: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Number of pipelines currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.settings.max_concurrent_tasks - self.semaphore.available_permits()
    }

    /// Receiver that fires when the worker stops, either through [`stop`]
    /// or because the queue or the store failed.
    ///
    /// [`stop`]: Worker::stop
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn the dispatch loop. Starting a running worker is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.state == WorkerState::Running {
            return Ok(());
        }

        info!(
            max_concurrent_tasks = self.settings.max_concurrent_tasks,
            "Starting worker"
        );

        let dispatch = DispatchLoop {
            queue: Arc::clone(&self.queue),
            executor: Arc::clone(&self.executor),
            settings: self.settings.clone(),
            semaphore: Arc::clone(&self.semaphore),
            shutdown_tx: self.shutdown_tx.clone(),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.loop_handle = Some(tokio::spawn(dispatch.run(shutdown_rx)));
        self.state = WorkerState::Running;
        Ok(())
    }

    /// Signal shutdown and wait for the dispatch loop to drain.
    ///
    /// Returns the loop's error if it ended because of a queue or store
    /// failure.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == WorkerState::Stopped {
            return Ok(());
        }
        info!("Stopping worker");
        let _ = self.shutdown_tx.send(());
        self.state = WorkerState::Stopped;

        let Some(handle) = self.loop_handle.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(result) => {
                info!("Worker stopped");
                result
            }
            Err(e) => Err(anyhow!("dispatch loop panicked: {e}")),
        }
    }
}

struct DispatchLoop {
    queue: Arc<dyn TaskQueue>,
    executor: Arc<TaskExecutor>,
    settings: WorkerSettings,
    semaphore: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DispatchLoop {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut pipelines: JoinSet<PipelineResult> = JoinSet::new();
        info!("Dispatch loop started");

        let outcome = loop {
            if let Err(e) = Self::reap(&mut pipelines) {
                break Err(self.store_failed(e));
            }

            let permit = tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Dispatch loop received shutdown signal");
                    break Ok(());
                }
                Some(joined) = pipelines.join_next(), if !pipelines.is_empty() => {
                    match Self::log_outcome(joined) {
                        Ok(()) => continue,
                        Err(e) => break Err(self.store_failed(e)),
                    }
                }
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            // The blocking pop is not raced against shutdown: a popped id
            // must always reach a pipeline.
            match self.queue.dequeue_blocking(self.settings.queue_poll).await {
                Ok(Some(task_id)) => {
                    debug!(%task_id, "Admitted task");
                    let executor = Arc::clone(&self.executor);
                    pipelines.spawn(async move {
                        let result = executor.run(task_id).await;
                        drop(permit);
                        (task_id, result)
                    });
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    error!(error = %e, "Task queue failed, stopping dispatch loop");
                    let _ = self.shutdown_tx.send(());
                    break Err(anyhow!(e).context("task queue failed"));
                }
            }

            match shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    info!("Dispatch loop received shutdown signal");
                    break Ok(());
                }
                Err(_) => {}
            }
        };

        self.drain(pipelines).await;
        info!("Dispatch loop stopped");
        outcome
    }

    /// Collect finished pipelines without waiting. Stops at the first store
    /// failure.
    fn reap(pipelines: &mut JoinSet<PipelineResult>) -> Result<(), StoreError> {
        while let Some(joined) = pipelines.try_join_next() {
            Self::log_outcome(joined)?;
        }
        Ok(())
    }

    fn store_failed(&self, e: StoreError) -> anyhow::Error {
        error!(error = %e, "Task store failed, stopping dispatch loop");
        let _ = self.shutdown_tx.send(());
        anyhow!(e).context("task store failed")
    }

    /// Give in-flight pipelines the grace period, then abort the rest.
    async fn drain(&self, mut pipelines: JoinSet<PipelineResult>) {
        if pipelines.is_empty() {
            return;
        }
        info!(in_flight = pipelines.len(), "Waiting for in-flight tasks");

        let waited = timeout(self.settings.shutdown_grace, async {
            while let Some(joined) = pipelines.join_next().await {
                let _ = Self::log_outcome(joined);
            }
        })
        .await;

        if waited.is_err() {
            warn!(
                aborted = pipelines.len(),
                "Shutdown grace elapsed, aborting in-flight tasks"
            );
            pipelines.abort_all();
            while pipelines.join_next().await.is_some() {}
        }
    }

    /// Log a finished pipeline and hand back its store error, if any.
    fn log_outcome(joined: Result<PipelineResult, tokio::task::JoinError>) -> Result<(), StoreError> {
        match joined {
            Ok((_, Ok(()))) => Ok(()),
            Ok((task_id, Err(e))) => {
                error!(%task_id, error = %e, "Task store failed while running task");
                Err(e)
            }
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => {
                error!(error = %e, "Task pipeline panicked");
                Ok(())
            }
        }
    }
}
