//! Domain layer for the task runner
//!
//! Core models, the failure taxonomy of task execution, and the port traits
//! that storage, queue, planner and tool adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::ExecutionError;
