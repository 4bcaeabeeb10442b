use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the task runner.
///
/// The engine knobs sit at the top level so they map onto flat environment
/// variables (`APP_MAX_STEPS`, `APP_RETRY_JITTER`, ...); ambient concerns live
/// in nested sections (`APP_STORE__KIND`, `APP_LOGGING__LEVEL`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of tool steps a plan may contain
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Deadline for one tool step, covering every retry and backoff sleep
    #[serde(default = "default_step_timeout_seconds")]
    pub step_timeout_seconds: f64,

    /// Number of task pipelines allowed to run at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Attempts per tool step, including the first
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Backoff before the second attempt, in seconds
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: f64,

    /// Upper bound on the exponential part of the backoff, in seconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: f64,

    /// Uniform random delay added to every backoff, in seconds
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,

    /// How long the dispatch loop blocks on the queue before re-checking shutdown
    #[serde(default = "default_queue_poll_seconds")]
    pub queue_poll_seconds: f64,

    /// How long in-flight pipelines may run after shutdown before being aborted
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: f64,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_steps() -> usize {
    5
}

const fn default_step_timeout_seconds() -> f64 {
    8.0
}

const fn default_max_concurrent_tasks() -> usize {
    10
}

const fn default_retry_max_attempts() -> u32 {
    3
}

const fn default_retry_base_delay() -> f64 {
    0.3
}

const fn default_retry_max_delay() -> f64 {
    2.0
}

const fn default_retry_jitter() -> f64 {
    0.2
}

const fn default_queue_poll_seconds() -> f64 {
    1.0
}

const fn default_shutdown_grace_seconds() -> f64 {
    5.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_timeout_seconds: default_step_timeout_seconds(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            retry_jitter: default_retry_jitter(),
            queue_poll_seconds: default_queue_poll_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            planner: PlannerConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.step_timeout_seconds)
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_secs_f64(self.queue_poll_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_grace_seconds)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Socket address the API listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Which storage backend holds tasks and the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local store and queue; nothing survives a restart
    Memory,
    /// `SQLite` task store with an in-process queue
    Sqlite,
    /// Redis task store and Redis list queue
    Redis,
}

/// Store and queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,

    /// Path to the `SQLite` database file
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Maximum number of `SQLite` connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Redis list used as the task queue
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

const fn default_store_kind() -> StoreKind {
    StoreKind::Memory
}

fn default_sqlite_path() -> String {
    "llm-task-runner.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_queue_name() -> String {
    "queue:tasks".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
            redis_url: default_redis_url(),
            queue_name: default_queue_name(),
        }
    }
}

/// Which planner strategy turns goals into plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    Rules,
    Openai,
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlannerConfig {
    #[serde(default = "default_planner_kind")]
    pub kind: PlannerKind,

    /// Model used by the OpenAI-compatible planner
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; falls back to `OPENAI_API_KEY` when unset
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout for planning calls, in seconds
    #[serde(default = "default_planner_timeout_seconds")]
    pub timeout_seconds: f64,
}

const fn default_planner_kind() -> PlannerKind {
    PlannerKind::Rules
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

const fn default_planner_timeout_seconds() -> f64 {
    30.0
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            kind: default_planner_kind(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            timeout_seconds: default_planner_timeout_seconds(),
        }
    }
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolsConfig {
    /// Request timeout for `http_get`, in seconds
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: f64,

    /// Disable `http_get` entirely; plans that use it fail with an unknown tool
    #[serde(default)]
    pub disable_http_get: bool,
}

const fn default_http_timeout_seconds() -> f64 {
    6.0
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: default_http_timeout_seconds(),
            disable_http_get: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
