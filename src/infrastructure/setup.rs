//! Wiring of the service objects from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::application::{ExecutionSettings, TaskExecutor, Worker, WorkerSettings};
use crate::domain::models::{Config, PlannerKind, StoreKind};
use crate::domain::ports::{Planner, TaskQueue, TaskStore};
use crate::infrastructure::planner::{OpenAiPlanner, OpenAiPlannerConfig, RuleBasedPlanner};
use crate::infrastructure::queue::{InMemoryTaskQueue, RedisTaskQueue};
use crate::infrastructure::store::{InMemoryTaskStore, RedisTaskStore, SqliteTaskStore};
use crate::infrastructure::tools::ToolRegistry;
use crate::services::{Metrics, TaskService};

/// Every long-lived service object, built once at start-up.
pub struct Components {
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub planner: Arc<dyn Planner>,
    pub tools: ToolRegistry,
    pub metrics: Arc<Metrics>,
}

impl Components {
    /// Build the backend selected by `config.store.kind`.
    pub async fn build(config: &Config) -> Result<Self> {
        let (store, queue): (Arc<dyn TaskStore>, Arc<dyn TaskQueue>) = match config.store.kind {
            StoreKind::Memory => (
                Arc::new(InMemoryTaskStore::new()),
                Arc::new(InMemoryTaskQueue::new()),
            ),
            StoreKind::Sqlite => {
                let store = SqliteTaskStore::connect(&config.store.sqlite_path, config.store.max_connections)
                    .await
                    .context("Failed to open SQLite task store")?;
                store.migrate().await.context("Failed to run migrations")?;
                (Arc::new(store), Arc::new(InMemoryTaskQueue::new()))
            }
            StoreKind::Redis => {
                let store = RedisTaskStore::connect(&config.store.redis_url)
                    .await
                    .context("Failed to connect Redis task store")?;
                let queue = RedisTaskQueue::connect(&config.store.redis_url, config.store.queue_name.clone())
                    .await
                    .context("Failed to connect Redis task queue")?;
                (Arc::new(store), Arc::new(queue))
            }
        };
        info!(store = ?config.store.kind, "Task backend ready");

        Self::with_backend(config, store, queue)
    }

    /// Build everything except the store and queue, which are supplied.
    pub fn with_backend(
        config: &Config,
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self> {
        let planner: Arc<dyn Planner> = match config.planner.kind {
            PlannerKind::Rules => Arc::new(RuleBasedPlanner::new()),
            PlannerKind::Openai => Arc::new(
                OpenAiPlanner::new(OpenAiPlannerConfig::from_config(&config.planner, config.max_steps))
                    .context("Failed to build OpenAI planner")?,
            ),
        };
        let tools = ToolRegistry::from_config(&config.tools).context("Failed to build tool registry")?;
        info!(planner = planner.name(), tools = ?tools.names(), "Execution components ready");

        Ok(Self {
            store,
            queue,
            planner,
            tools,
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn task_service(&self) -> Arc<TaskService> {
        Arc::new(TaskService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.metrics),
        ))
    }

    pub fn executor(&self, config: &Config) -> Arc<TaskExecutor> {
        Arc::new(TaskExecutor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.planner),
            self.tools.clone(),
            Arc::clone(&self.metrics),
            ExecutionSettings::from_config(config),
        ))
    }

    /// A stopped worker draining this backend's queue.
    pub fn worker(&self, config: &Config) -> Worker {
        Worker::new(
            Arc::clone(&self.queue),
            self.executor(config),
            WorkerSettings::from_config(config),
        )
    }
}
