//! Task domain model.
//!
//! A task is created from a natural-language goal and moves through a small,
//! monotone status machine while the worker executes its plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::step::StepRecord;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and waiting on the queue
    Queued,
    /// Admitted by the worker and executing
    Running,
    /// Every planned step completed
    Succeeded,
    /// Planning or a tool step failed
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[Self::Running],
            Self::Running => &[Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }

    /// Statuses from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [TaskStatus] {
        match self {
            Self::Queued => &[],
            Self::Running => &[Self::Queued],
            Self::Succeeded | Self::Failed => &[Self::Running],
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A unit of work created from a goal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub goal: String,
    pub status: TaskStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl Task {
    /// Create a fresh `queued` task with a new identifier.
    pub fn new(goal: impl Into<String>, idempotency_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            goal: goal.into(),
            status: TaskStatus::Queued,
            idempotency_key,
            created_at: now,
            updated_at: now,
            steps: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Apply a partial update in place, enforcing the status machine.
    ///
    /// Returns the rejected `(from, to)` pair when the status change is not a
    /// valid transition; the task is left untouched in that case.
    pub fn apply(&mut self, update: &TaskUpdate) -> Result<(), (TaskStatus, TaskStatus)> {
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err((self.status, next));
            }
            self.status = next;
        }
        if let Some(result) = &update.result {
            self.result = Some(result.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial mutation of a task's mutable fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn succeeded(result: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Succeeded),
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            result: None,
            error: Some(error.into()),
        }
    }
}
