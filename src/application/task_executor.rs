use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{
    Config, JsonMap, NewStep, PlannedStep, StepKind, Task, TaskStatus, TaskUpdate, ToolName,
};
use crate::domain::ports::{Planner, StoreError, TaskStore};
use crate::domain::ExecutionError;
use crate::infrastructure::tools::ToolRegistry;
use crate::services::{Counter, Metrics, RetryError, RetryPolicy};

/// Engine limits applied to every task.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Longest plan accepted
    pub max_steps: usize,

    /// Deadline for one tool step, retries and backoff included
    pub step_timeout: Duration,

    pub retry: RetryPolicy,
}

impl ExecutionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.max_steps,
            step_timeout: config.step_timeout(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Runs one task from `queued` to a terminal status.
///
/// Pipeline:
/// 1. mark `running`
/// 2. plan, recording a `plan` step
/// 3. reject plans longer than `max_steps`
/// 4. execute each planned step under retry and the step deadline,
///    recording one `tool` step each and stopping at the first failure
/// 5. mark `succeeded` with a summary, or `failed` with the error
///
/// Execution failures end up on the task. Only store failures are returned.
pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    planner: Arc<dyn Planner>,
    tools: ToolRegistry,
    metrics: Arc<Metrics>,
    settings: ExecutionSettings,
}

type StepOutcome<T> = Result<Result<T, ExecutionError>, StoreError>;

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        planner: Arc<dyn Planner>,
        tools: ToolRegistry,
        metrics: Arc<Metrics>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            store,
            planner,
            tools,
            metrics,
            settings,
        }
    }

    /// Execute the task with `task_id` if it is still `queued`.
    ///
    /// Missing tasks and tasks already past `queued` are skipped.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn run(&self, task_id: Uuid) -> Result<(), StoreError> {
        let Some(task) = self.store.get_task(task_id).await? else {
            warn!("Dequeued task does not exist, skipping");
            return Ok(());
        };
        if task.status != TaskStatus::Queued {
            debug!(status = %task.status, "Task already picked up, skipping");
            return Ok(());
        }

        match self
            .store
            .update_task_fields(task_id, TaskUpdate::status(TaskStatus::Running))
            .await
        {
            Ok(_) => {}
            Err(StoreError::InvalidStateTransition { from, .. }) => {
                debug!(status = %from, "Lost the race to start task, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        let _running = self.metrics.track_running();
        info!("Task running");

        match self.execute(&task).await? {
            Ok(summary) => {
                self.store
                    .update_task_fields(task_id, TaskUpdate::succeeded(summary.clone()))
                    .await?;
                self.metrics.inc(Counter::TasksSucceeded);
                info!(%summary, "Task succeeded");
            }
            Err(err) => {
                self.store
                    .update_task_fields(task_id, TaskUpdate::failed(err.to_string()))
                    .await?;
                self.metrics.inc(Counter::TasksFailed);
                warn!(error_kind = err.kind(), error = %err, "Task failed");
            }
        }
        Ok(())
    }

    async fn execute(&self, task: &Task) -> StepOutcome<String> {
        let steps = match self.plan(task).await? {
            Ok(steps) => steps,
            Err(err) => return Ok(Err(err)),
        };

        if steps.len() > self.settings.max_steps {
            return Ok(Err(ExecutionError::PlanTooLong {
                planned: steps.len(),
                max: self.settings.max_steps,
            }));
        }

        let mut used = Vec::with_capacity(steps.len());
        for step in &steps {
            if let Err(err) = self.execute_step(task.task_id, step).await? {
                return Ok(Err(err));
            }
            used.push(step.tool());
        }

        Ok(Ok(summarize(&used)))
    }

    /// Ask the planner for a plan and record the `plan` step.
    async fn plan(&self, task: &Task) -> StepOutcome<Vec<PlannedStep>> {
        let mut input = JsonMap::new();
        input.insert("goal".into(), Value::String(task.goal.clone()));

        let started = Instant::now();
        let planned = self.planner.plan(&task.goal).await;
        let latency_ms = elapsed_ms(started);
        self.metrics.inc(Counter::LlmPlans);

        match planned {
            Ok(steps) => {
                let mut output = JsonMap::new();
                output.insert("planned_steps".into(), serde_json::to_value(&steps)?);
                self.store
                    .append_step(
                        task.task_id,
                        NewStep::succeeded(StepKind::Plan, self.planner.name(), input, output, latency_ms),
                    )
                    .await?;
                debug!(planned = steps.len(), latency_ms, "Plan recorded");
                Ok(Ok(steps))
            }
            Err(e) => {
                let err = ExecutionError::from(e);
                self.store
                    .append_step(
                        task.task_id,
                        NewStep::failed(StepKind::Plan, self.planner.name(), input, err.to_string(), latency_ms),
                    )
                    .await?;
                Ok(Err(err))
            }
        }
    }

    /// Run one planned step and record its `tool` step.
    async fn execute_step(&self, task_id: Uuid, step: &PlannedStep) -> StepOutcome<()> {
        let tool_name = step.tool();
        let input = step.args();
        self.metrics.inc(Counter::ToolCalls);

        let Some(tool) = self.tools.get(tool_name) else {
            let err = ExecutionError::UnknownTool(tool_name.to_string());
            self.record_failure(task_id, tool_name, input, &err, 0).await?;
            return Ok(Err(err));
        };

        let started = Instant::now();
        let attempt = self.settings.retry.execute(|| tool.execute(step), |_| true);
        let result = match timeout(self.settings.step_timeout, attempt).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(RetryError::Exhausted { attempts, last })) => Err(ExecutionError::RetryExhausted {
                tool: tool_name,
                attempts,
                last,
            }),
            Ok(Err(RetryError::Aborted(source))) => Err(ExecutionError::Tool {
                tool: tool_name,
                source,
            }),
            Err(_) => Err(ExecutionError::StepTimeout {
                seconds: self.settings.step_timeout.as_secs_f64(),
            }),
        };
        let latency_ms = elapsed_ms(started);

        match result {
            Ok(output) => {
                let record = self
                    .store
                    .append_step(
                        task_id,
                        NewStep::succeeded(StepKind::Tool, tool_name.as_str(), input, output, latency_ms),
                    )
                    .await?;
                debug!(step_no = record.step_no, tool = %tool_name, latency_ms, "Tool step succeeded");
                Ok(Ok(()))
            }
            Err(err) => {
                self.record_failure(task_id, tool_name, input, &err, latency_ms).await?;
                Ok(Err(err))
            }
        }
    }

    async fn record_failure(
        &self,
        task_id: Uuid,
        tool_name: ToolName,
        input: JsonMap,
        err: &ExecutionError,
        latency_ms: u64,
    ) -> Result<(), StoreError> {
        self.metrics.inc(Counter::ToolFailures);
        let record = self
            .store
            .append_step(
                task_id,
                NewStep::failed(StepKind::Tool, tool_name.as_str(), input, err.to_string(), latency_ms),
            )
            .await?;
        warn!(step_no = record.step_no, tool = %tool_name, error = %err, "Tool step failed");
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn summarize(tools: &[ToolName]) -> String {
    if tools.is_empty() {
        return "no tools required".to_string();
    }
    let names: Vec<&str> = tools.iter().map(ToolName::as_str).collect();
    format!("completed {} tool step(s): {}", tools.len(), names.join(", "))
}
