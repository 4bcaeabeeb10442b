//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - TaskStore: task persistence, idempotency, and the step log
//! - TaskQueue: handoff of task ids to the worker
//! - Planner: goal to plan
//! - Tool: one executable tool

pub mod errors;
pub mod planner;
pub mod task_queue;
pub mod task_store;
pub mod tool;

pub use errors::{PlannerError, QueueError, StoreError, ToolError};
pub use planner::Planner;
pub use task_queue::TaskQueue;
pub use task_store::{CreateOutcome, TaskStore};
pub use tool::Tool;
