//! Concurrency tests for the worker
//!
//! Admission bound, idempotent creation under contention, and shutdown.

mod common;

use async_trait::async_trait;
use futures::future::join_all;
use common::{fast_settings, worker_settings, FixedPlanner, Harness, SlowTool};
use llm_task_runner::application::{Worker, WorkerState};
use llm_task_runner::domain::models::{
    NewStep, PlannedStep, StepRecord, Task, TaskStatus, TaskUpdate, ToolName,
};
use llm_task_runner::domain::ports::{CreateOutcome, QueueError, StoreError, TaskQueue, TaskStore};
use llm_task_runner::infrastructure::store::InMemoryTaskStore;
use llm_task_runner::infrastructure::queue::InMemoryTaskQueue;
use llm_task_runner::infrastructure::tools::ToolRegistry;
use llm_task_runner::services::{Counter, TaskService};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn slow_harness(max_concurrent_tasks: usize, delay: Duration) -> (Harness, Arc<SlowTool>) {
    let slow = SlowTool::new(ToolName::HttpGet, delay);
    let harness = Harness::with(
        Arc::new(FixedPlanner(vec![PlannedStep::http_get("http://slow.test")])),
        ToolRegistry::new().with(slow.clone()),
        fast_settings(),
        worker_settings(max_concurrent_tasks),
    );
    (harness, slow)
}

#[tokio::test]
async fn test_never_more_than_max_concurrent_pipelines() {
    let (mut harness, slow) = slow_harness(3, Duration::from_millis(50));

    let mut ids = Vec::new();
    for i in 0..12 {
        ids.push(harness.submit(&format!("goal {i}")).await);
    }
    harness.worker.start().unwrap();

    for task_id in ids {
        let task = harness.wait_terminal(task_id).await;
        assert_eq!(task.status, TaskStatus::Succeeded);
    }
    harness.worker.stop().await.unwrap();

    assert_eq!(slow.calls(), 12);
    assert!(slow.peak() <= 3, "peak concurrency was {}", slow.peak());
    assert!(slow.peak() >= 2, "pipelines never overlapped");
    assert_eq!(harness.metrics.get(Counter::TasksSucceeded), 12);
    assert_eq!(harness.metrics.get(Counter::TasksRunning), 0);
}

#[tokio::test]
async fn test_backlog_stays_on_queue_while_permits_are_taken() {
    let (mut harness, _slow) = slow_harness(1, Duration::from_millis(300));

    for i in 0..4 {
        harness.submit(&format!("goal {i}")).await;
    }
    harness.worker.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.worker.in_flight(), 1);
    assert_eq!(harness.metrics.get(Counter::TasksRunning), 1);
    // One id taken by the running pipeline; the rest wait on the queue.
    assert_eq!(common::queue_len(harness.queue.as_ref()).await, 3);

    harness.worker.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_submissions_with_same_key_create_one_task() {
    let harness = Harness::new();
    let service = Arc::new(TaskService::new(
        harness.store.clone(),
        harness.queue.clone(),
        harness.metrics.clone(),
    ));

    let handles = (0..32).map(|i| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .submit(format!("calculate: {i}+1"), Some("shared-key".into()))
                .await
                .unwrap()
        })
    });

    let mut ids = HashSet::new();
    let mut created = 0;
    for joined in join_all(handles).await {
        let outcome = joined.unwrap();
        if outcome.was_created() {
            created += 1;
        }
        ids.insert(outcome.task().task_id);
    }

    assert_eq!(created, 1);
    assert_eq!(ids.len(), 1);
    assert_eq!(common::queue_len(harness.queue.as_ref()).await, 1);
    assert_eq!(harness.metrics.get(Counter::TaskCreated), 1);
}

#[tokio::test]
async fn test_redelivered_task_runs_once() {
    let (mut harness, slow) = slow_harness(2, Duration::from_millis(10));
    let task_id = harness.submit("goal").await;
    harness.queue.enqueue(task_id).await.unwrap();
    assert_eq!(common::queue_len(harness.queue.as_ref()).await, 1);
    harness.worker.start().unwrap();

    let task = harness.wait_terminal(task_id).await;
    harness.queue.enqueue(task_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.worker.stop().await.unwrap();

    assert_eq!(common::queue_len(harness.queue.as_ref()).await, 0);

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(slow.calls(), 1);
    let steps = harness.store.get_steps(task_id).await.unwrap();
    assert_eq!(steps.len(), 2);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_task_within_grace() {
    let (mut harness, _slow) = slow_harness(2, Duration::from_millis(200));
    harness.worker.start().unwrap();

    let task_id = harness.submit("goal").await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    harness.worker.stop().await.unwrap();
    assert_eq!(harness.worker.state(), WorkerState::Stopped);

    let task = harness.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn test_stop_aborts_pipelines_after_grace() {
    let slow = SlowTool::new(ToolName::HttpGet, Duration::from_secs(30));
    let mut settings = fast_settings();
    settings.step_timeout = Duration::from_secs(60);
    let mut worker_settings = worker_settings(2);
    worker_settings.shutdown_grace = Duration::from_millis(100);
    let mut harness = Harness::with(
        Arc::new(FixedPlanner(vec![PlannedStep::http_get("http://slow.test")])),
        ToolRegistry::new().with(slow.clone()),
        settings,
        worker_settings,
    );
    harness.worker.start().unwrap();

    let task_id = harness.submit("goal").await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    tokio::time::timeout(Duration::from_secs(5), harness.worker.stop())
        .await
        .expect("stop must not wait for the slow tool")
        .unwrap();

    // Aborted mid-step: left running, gauge released by the drop guard.
    let task = harness.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(harness.metrics.get(Counter::TasksRunning), 0);
}

struct BrokenQueue;

#[async_trait]
impl TaskQueue for BrokenQueue {
    async fn enqueue(&self, _task_id: Uuid) -> Result<(), QueueError> {
        Err(QueueError::Closed)
    }

    async fn dequeue_blocking(&self, _timeout: Duration) -> Result<Option<Uuid>, QueueError> {
        Err(QueueError::Closed)
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Err(QueueError::Closed)
    }
}

#[tokio::test]
async fn test_queue_failure_stops_worker_and_signals_shutdown() {
    let harness = Harness::new();
    let executor = Arc::new(llm_task_runner::application::TaskExecutor::new(
        harness.store.clone(),
        Arc::new(FixedPlanner(vec![])),
        ToolRegistry::new(),
        harness.metrics.clone(),
        fast_settings(),
    ));
    let mut worker = Worker::new(Arc::new(BrokenQueue), executor, worker_settings(1));
    let mut stopped = worker.subscribe_shutdown();
    worker.start().unwrap();

    tokio::time::timeout(Duration::from_secs(2), stopped.recv())
        .await
        .expect("queue failure should broadcast shutdown")
        .unwrap();

    let err = worker.stop().await.unwrap_err();
    assert!(err.to_string().contains("task queue failed"));
}

/// Delegates to the in-memory store but cannot append steps.
struct StepWriteFailingStore {
    inner: Arc<InMemoryTaskStore>,
}

#[async_trait]
impl TaskStore for StepWriteFailingStore {
    async fn create_or_get_task(&self, task: Task) -> Result<CreateOutcome, StoreError> {
        self.inner.create_or_get_task(task).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.inner.get_task(id).await
    }

    async fn update_task_fields(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError> {
        self.inner.update_task_fields(id, update).await
    }

    async fn append_step(&self, id: Uuid, _step: NewStep) -> Result<StepRecord, StoreError> {
        Err(StoreError::CorruptRecord {
            task_id: id.to_string(),
            reason: "disk full".into(),
        })
    }

    async fn get_steps(&self, id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        self.inner.get_steps(id).await
    }
}

#[tokio::test]
async fn test_store_failure_stops_worker_and_signals_shutdown() {
    let harness = Harness::new();
    let store = Arc::new(StepWriteFailingStore {
        inner: harness.store.clone(),
    });
    let executor = Arc::new(llm_task_runner::application::TaskExecutor::new(
        store,
        Arc::new(FixedPlanner(vec![PlannedStep::calc("1+1")])),
        ToolRegistry::new().with(Arc::new(llm_task_runner::infrastructure::tools::CalcTool)),
        harness.metrics.clone(),
        fast_settings(),
    ));
    let mut worker = Worker::new(harness.queue.clone(), executor, worker_settings(2));
    let mut stopped = worker.subscribe_shutdown();
    worker.start().unwrap();

    let task_id = harness.submit("calc: 1+1").await;

    tokio::time::timeout(Duration::from_secs(2), stopped.recv())
        .await
        .expect("store failure should broadcast shutdown")
        .unwrap();

    let err = worker.stop().await.unwrap_err();
    assert!(err.to_string().contains("task store failed"));
    assert_eq!(worker.state(), WorkerState::Stopped);

    let task = harness.store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(harness.metrics.get(Counter::TasksRunning), 0);
}

#[tokio::test]
async fn test_submit_surfaces_queue_failure() {
    let harness = Harness::new();
    let service = TaskService::new(harness.store.clone(), Arc::new(BrokenQueue), harness.metrics.clone());

    let err = service.submit("calculate: 1+1".into(), None).await.unwrap_err();
    assert!(matches!(err, llm_task_runner::services::SubmitError::Queue(QueueError::Closed)));
}

/// Fails the first `enqueue`, then behaves like the in-memory queue.
struct FailOnceQueue {
    inner: InMemoryTaskQueue,
    failed: AtomicBool,
}

#[async_trait]
impl TaskQueue for FailOnceQueue {
    async fn enqueue(&self, task_id: Uuid) -> Result<(), QueueError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.inner.enqueue(task_id).await
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<Uuid>, QueueError> {
        self.inner.dequeue_blocking(timeout).await
    }

    async fn len(&self) -> Result<usize, QueueError> {
        self.inner.len().await
    }
}

#[tokio::test]
async fn test_resubmit_recovers_task_whose_enqueue_failed() {
    let harness = Harness::new();
    let queue = Arc::new(FailOnceQueue {
        inner: InMemoryTaskQueue::new(),
        failed: AtomicBool::new(false),
    });
    let service = TaskService::new(harness.store.clone(), queue.clone(), harness.metrics.clone());

    let err = service
        .submit("calculate: 1+1".into(), Some("retry-me".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, llm_task_runner::services::SubmitError::Queue(QueueError::Closed)));

    let retried = service
        .submit("calculate: 1+1".into(), Some("retry-me".into()))
        .await
        .unwrap();
    assert!(!retried.was_created());
    assert_eq!(retried.task().status, TaskStatus::Queued);
    assert_eq!(common::queue_len(queue.as_ref()).await, 1);

    let again = service
        .submit("calculate: 1+1".into(), Some("retry-me".into()))
        .await
        .unwrap();
    assert_eq!(again.task().task_id, retried.task().task_id);
    assert_eq!(common::queue_len(queue.as_ref()).await, 1);
    assert_eq!(harness.metrics.get(Counter::TaskCreated), 1);

    let executor = Arc::new(llm_task_runner::application::TaskExecutor::new(
        harness.store.clone(),
        Arc::new(llm_task_runner::infrastructure::planner::RuleBasedPlanner::new()),
        ToolRegistry::new().with(Arc::new(llm_task_runner::infrastructure::tools::CalcTool)),
        harness.metrics.clone(),
        fast_settings(),
    ));
    let mut worker = Worker::new(queue, executor, worker_settings(1));
    worker.start().unwrap();
    let task = common::wait_terminal(harness.store.as_ref(), retried.task().task_id, Duration::from_secs(5)).await;
    worker.stop().await.unwrap();

    assert_eq!(task.status, TaskStatus::Succeeded);
}
