//! Infrastructure layer module
//!
//! Adapters that satisfy the domain ports, plus the ambient plumbing:
//! - Task stores (in-memory, SQLite with sqlx, Redis)
//! - Task queues (in-process channel, Redis list)
//! - Planners (rule-based, OpenAI-compatible)
//! - Tools (`http_get`, `calc`) and their registry
//! - HTTP API (axum)
//! - Configuration management and logging
//! - Start-up wiring

pub mod config;
pub mod http;
pub mod logging;
pub mod planner;
pub mod queue;
pub mod setup;
pub mod store;
pub mod tools;
