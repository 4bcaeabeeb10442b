//! Common test utilities for integration tests
//!
//! Stub planners and tools plus a harness that wires an in-memory backend to a
//! worker with fast retry settings.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use llm_task_runner::application::{ExecutionSettings, TaskExecutor, Worker, WorkerSettings};
use llm_task_runner::domain::models::{JsonMap, PlannedStep, Task, ToolName};
use llm_task_runner::domain::ports::{Planner, PlannerError, TaskQueue, TaskStore, Tool, ToolError};
use llm_task_runner::infrastructure::planner::RuleBasedPlanner;
use llm_task_runner::infrastructure::queue::InMemoryTaskQueue;
use llm_task_runner::infrastructure::store::InMemoryTaskStore;
use llm_task_runner::infrastructure::tools::{CalcTool, ToolRegistry};
use llm_task_runner::services::{Metrics, RetryPolicy, TaskService};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Retry settings small enough to keep tests fast.
pub fn fast_settings() -> ExecutionSettings {
    ExecutionSettings {
        max_steps: 5,
        step_timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), Duration::ZERO),
    }
}

pub fn worker_settings(max_concurrent_tasks: usize) -> WorkerSettings {
    WorkerSettings {
        max_concurrent_tasks,
        queue_poll: Duration::from_millis(20),
        shutdown_grace: Duration::from_secs(2),
    }
}

/// Planner that returns the same plan for every goal.
pub struct FixedPlanner(pub Vec<PlannedStep>);

#[async_trait]
impl Planner for FixedPlanner {
    fn name(&self) -> &str {
        "fixed_planner"
    }

    async fn plan(&self, _goal: &str) -> Result<Vec<PlannedStep>, PlannerError> {
        Ok(self.0.clone())
    }
}

/// Tool that always fails with a transport error and counts its calls.
pub struct AlwaysFailTool {
    pub name: ToolName,
    pub calls: AtomicUsize,
}

impl AlwaysFailTool {
    pub fn new(name: ToolName) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for AlwaysFailTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn execute(&self, _step: &PlannedStep) -> Result<JsonMap, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::Http("connection refused".into()))
    }
}

/// Tool that sleeps before answering and tracks how many calls overlap.
pub struct SlowTool {
    pub name: ToolName,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl SlowTool {
    pub fn new(name: ToolName, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            delay,
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn execute(&self, _step: &PlannedStep) -> Result<JsonMap, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        let mut output = JsonMap::new();
        output.insert("slept_ms".into(), serde_json::json!(self.delay.as_millis() as u64));
        Ok(output)
    }
}

/// In-memory store and queue, a task service, and a worker ready to start.
pub struct Harness {
    pub store: Arc<InMemoryTaskStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub metrics: Arc<Metrics>,
    pub service: TaskService,
    pub worker: Worker,
}

impl Harness {
    /// Rule-based planner with only the real `calc` tool registered.
    pub fn new() -> Self {
        Self::with(
            Arc::new(RuleBasedPlanner::new()),
            ToolRegistry::new().with(Arc::new(CalcTool)),
            fast_settings(),
            worker_settings(4),
        )
    }

    pub fn with(
        planner: Arc<dyn Planner>,
        tools: ToolRegistry,
        settings: ExecutionSettings,
        worker_settings: WorkerSettings,
    ) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let metrics = Arc::new(Metrics::new());

        let service = TaskService::new(store.clone(), queue.clone(), metrics.clone());
        let executor = Arc::new(TaskExecutor::new(
            store.clone(),
            planner,
            tools,
            metrics.clone(),
            settings,
        ));
        let worker = Worker::new(queue.clone(), executor, worker_settings);

        Self {
            store,
            queue,
            metrics,
            service,
            worker,
        }
    }

    pub async fn submit(&self, goal: &str) -> Uuid {
        self.service
            .submit(goal.to_string(), None)
            .await
            .expect("submit failed")
            .task()
            .task_id
    }

    /// Poll the store until the task is terminal.
    pub async fn wait_terminal(&self, task_id: Uuid) -> Task {
        wait_terminal(self.store.as_ref(), task_id, Duration::from_secs(10)).await
    }
}

pub async fn wait_terminal(store: &dyn TaskStore, task_id: Uuid, within: Duration) -> Task {
    tokio::time::timeout(within, async {
        loop {
            if let Some(task) = store.get_task(task_id).await.expect("store failed") {
                if task.status.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not finish in time")
}

/// Number of ids currently waiting on the queue.
pub async fn queue_len(queue: &dyn TaskQueue) -> usize {
    queue.len().await.expect("queue len failed")
}
