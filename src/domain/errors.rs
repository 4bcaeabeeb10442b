//! Failure taxonomy for task execution.

use thiserror::Error;

use crate::domain::models::ToolName;
use crate::domain::ports::errors::{PlannerError, ToolError};

/// Why a task pipeline ended in `failed`.
///
/// Every variant is caught at the pipeline boundary and turned into the
/// task's terminal error string; none of them stop the dispatch loop.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A tool failed with an error the retry policy does not retry.
    #[error("{tool} failed: {source}")]
    Tool {
        tool: ToolName,
        #[source]
        source: ToolError,
    },

    /// Every attempt failed; wraps the last tool error.
    #[error("{tool} failed after {attempts} attempts (retry exhausted): {last}")]
    RetryExhausted {
        tool: ToolName,
        attempts: u32,
        last: ToolError,
    },

    /// The retried operation did not finish before the step deadline.
    #[error("step timeout after {seconds}s")]
    StepTimeout { seconds: f64 },

    /// The planner produced more steps than allowed.
    #[error("too many steps planned: {planned} > {max}")]
    PlanTooLong { planned: usize, max: usize },

    /// A plan referenced a tool this deployment does not provide.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The planner itself failed.
    #[error("planning failed: {0}")]
    Planner(#[source] PlannerError),
}

impl From<PlannerError> for ExecutionError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::UnknownTool(name) => Self::UnknownTool(name),
            other => Self::Planner(other),
        }
    }
}

impl ExecutionError {
    /// Short machine-readable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "tool_error",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::StepTimeout { .. } => "step_timeout",
            Self::PlanTooLong { .. } => "plan_too_long",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Planner(_) => "planner_error",
        }
    }
}
