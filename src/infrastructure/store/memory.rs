//! In-memory task store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{NewStep, StepRecord, Task, TaskUpdate};
use crate::domain::ports::{CreateOutcome, StoreError, TaskStore};

#[derive(Default)]
struct Inner {
    tasks: HashMap<Uuid, Task>,
    idempotency: HashMap<String, Uuid>,
}

/// Task store backed by process memory.
///
/// One lock guards both maps, which makes the idempotency check-and-create
/// atomic across the whole key space.
#[derive(Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_or_get_task(&self, task: Task) -> Result<CreateOutcome, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(key) = &task.idempotency_key {
            if let Some(existing) = inner
                .idempotency
                .get(key)
                .and_then(|id| inner.tasks.get(id))
            {
                debug!(task_id = %existing.task_id, "Idempotency hit");
                return Ok(CreateOutcome::Existing(existing.clone()));
            }
            inner.idempotency.insert(key.clone(), task.task_id);
        }

        inner.tasks.insert(task.task_id, task.clone());
        Ok(CreateOutcome::Created(task))
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn update_task_fields(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;

        task.apply(&update)
            .map_err(|(from, to)| StoreError::InvalidStateTransition { task_id: id, from, to })?;

        Ok(task.clone())
    }

    async fn append_step(&self, id: Uuid, step: NewStep) -> Result<StepRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;

        let step_no = u32::try_from(task.steps.len() + 1).unwrap_or(u32::MAX);
        let record = step.numbered(step_no);
        task.steps.push(record.clone());
        Ok(record)
    }

    async fn get_steps(&self, id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        let inner = self.inner.read().await;
        let task = inner.tasks.get(&id).ok_or(StoreError::TaskNotFound(id))?;
        Ok(task.steps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{JsonMap, StepKind, TaskStatus};
    use std::sync::Arc;

    fn plan_step() -> NewStep {
        NewStep::succeeded(StepKind::Plan, "rule_planner", JsonMap::new(), JsonMap::new(), 0)
    }

    #[tokio::test]
    async fn test_idempotency_key_returns_first_task() {
        let store = InMemoryTaskStore::new();

        let first = store
            .create_or_get_task(Task::new("first goal", Some("abc".into())))
            .await
            .unwrap();
        let second = store
            .create_or_get_task(Task::new("second goal", Some("abc".into())))
            .await
            .unwrap();

        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.task().task_id, second.task().task_id);
        assert_eq!(second.task().goal, "first goal");
    }

    #[tokio::test]
    async fn test_tasks_without_key_are_always_created() {
        let store = InMemoryTaskStore::new();
        let a = store.create_or_get_task(Task::new("g", None)).await.unwrap();
        let b = store.create_or_get_task(Task::new("g", None)).await.unwrap();
        assert!(a.was_created() && b.was_created());
        assert_ne!(a.task().task_id, b.task().task_id);
    }

    #[tokio::test]
    async fn test_concurrent_creates_with_same_key_yield_one_task() {
        let store = Arc::new(InMemoryTaskStore::new());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .create_or_get_task(Task::new(format!("goal {i}"), Some("shared".into())))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut created = 0;
        let mut ids = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap();
            if outcome.was_created() {
                created += 1;
            }
            ids.push(outcome.task().task_id);
        }

        assert_eq!(created, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_append_step_numbers_gap_free() {
        let store = InMemoryTaskStore::new();
        let task = store.create_or_get_task(Task::new("g", None)).await.unwrap().into_task();

        for expected in 1..=4 {
            let record = store.append_step(task.task_id, plan_step()).await.unwrap();
            assert_eq!(record.step_no, expected);
        }

        let steps = store.get_steps(task.task_id).await.unwrap();
        let numbers: Vec<u32> = steps.iter().map(|s| s.step_no).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_update_missing_task_fails_loudly() {
        let store = InMemoryTaskStore::new();
        let err = store
            .update_task_fields(Uuid::new_v4(), TaskUpdate::status(TaskStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_refreshes_timestamp_and_rejects_regression() {
        let store = InMemoryTaskStore::new();
        let task = store.create_or_get_task(Task::new("g", None)).await.unwrap().into_task();

        let running = store
            .update_task_fields(task.task_id, TaskUpdate::status(TaskStatus::Running))
            .await
            .unwrap();
        assert!(running.updated_at >= task.updated_at);

        store
            .update_task_fields(task.task_id, TaskUpdate::failed("boom"))
            .await
            .unwrap();

        let err = store
            .update_task_fields(task.task_id, TaskUpdate::status(TaskStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidStateTransition {
                from: TaskStatus::Failed,
                to: TaskStatus::Running,
                ..
            }
        ));
    }
}
