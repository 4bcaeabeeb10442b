//! HTTP API (axum)
//!
//! - `POST /tasks`: create a task, or return the one behind an idempotency key
//! - `GET /tasks/{task_id}`: task with its step log
//! - `GET /metrics`: Prometheus counters
//! - `GET /health`, `GET /`: liveness

pub mod dto;
pub mod routes;
pub mod server;

pub use dto::{CreateTaskRequest, CreateTaskResponse, ErrorResponse};
pub use server::{router, serve, AppState};
