//! Application layer: the per-task pipeline and the dispatch loop that feeds it.

pub mod task_executor;
pub mod worker;

pub use task_executor::{ExecutionSettings, TaskExecutor};
pub use worker::{Worker, WorkerSettings, WorkerState};
