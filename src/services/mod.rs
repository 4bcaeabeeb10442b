//! Services shared by the API layer and the worker.

pub mod metrics;
pub mod retry;
pub mod task_service;

pub use metrics::{Counter, Metrics, RunningGuard};
pub use retry::{RetryError, RetryPolicy};
pub use task_service::{SubmitError, TaskService};
