use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::TaskStatus;

/// Task store errors
///
/// Anything other than `TaskNotFound` and `InvalidStateTransition` means the
/// backend itself is unavailable or corrupt and is treated as fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Invalid state transition for task {task_id} from {from} to {to}")]
    InvalidStateTransition {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Corrupt record for task {task_id}: {reason}")]
    CorruptRecord { task_id: String, reason: String },
}

/// Task queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue closed")]
    Closed,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid task id on queue: {0}")]
    InvalidId(String),
}

/// Errors raised by tool executors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// The arguments were not acceptable to the tool.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The calc expression used syntax outside the arithmetic whitelist.
    #[error("calc: disallowed syntax: {0}")]
    DisallowedSyntax(String),

    /// The calc expression parsed but could not be evaluated.
    #[error("calc failed: {0}")]
    Evaluation(String),

    /// The HTTP request failed.
    #[error("http_get failed: {0}")]
    Http(String),

    /// A tool was handed a step meant for a different tool.
    #[error("{tool} cannot execute a {got} step")]
    WrongStep { tool: String, got: String },
}

/// Errors raised by planners.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("planner request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("planner returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed plan: {0}")]
    MalformedPlan(String),
}
