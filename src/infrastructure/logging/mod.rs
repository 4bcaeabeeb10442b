//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with optional
//! daily-rolled JSON files through tracing-appender.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat};
pub use logger::LoggerImpl;
