use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::{Config, StoreKind};

/// Config file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "llm-task-runner.yaml";

/// Prefix for environment overrides; nested sections are split on `__`
pub const ENV_PREFIX: &str = "APP_";

/// Largest duration setting accepted, in seconds (one day)
pub const MAX_DURATION_SECONDS: f64 = 86_400.0;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_steps: {0}. Must be at least 1")]
    InvalidMaxSteps(usize),

    #[error("Invalid max_concurrent_tasks: {0}. Must be at least 1")]
    InvalidMaxConcurrentTasks(usize),

    #[error("Invalid retry_max_attempts: {0}. Must be at least 1")]
    InvalidRetryAttempts(u32),

    #[error("Invalid {name}: {value}. Must be a positive number of seconds")]
    InvalidDuration { name: &'static str, value: f64 },

    #[error("Invalid {name}: {value}. Must not exceed one day (86400 seconds)")]
    DurationTooLarge { name: &'static str, value: f64 },

    #[error("Invalid retry delays: retry_base_delay ({0}) must not exceed retry_max_delay ({1})")]
    InvalidBackoff(f64, f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. The YAML file at `path`, or `llm-task-runner.yaml` if present
    /// 3. Environment variables (`APP_*`, highest priority)
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let file = match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => Path::new(DEFAULT_CONFIG_FILE).to_path_buf(),
        };

        let config: Config = Self::figment(&file)
            .extract()
            .with_context(|| format!("Failed to load configuration (file: {})", file.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// The layered provider chain, exposed for `config` output and tests.
    pub fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_steps == 0 {
            return Err(ConfigError::InvalidMaxSteps(config.max_steps));
        }
        if config.max_concurrent_tasks == 0 {
            return Err(ConfigError::InvalidMaxConcurrentTasks(config.max_concurrent_tasks));
        }
        if config.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts(config.retry_max_attempts));
        }

        let positive = [
            ("step_timeout_seconds", config.step_timeout_seconds),
            ("queue_poll_seconds", config.queue_poll_seconds),
            ("planner.timeout_seconds", config.planner.timeout_seconds),
            ("tools.http_timeout_seconds", config.tools.http_timeout_seconds),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidDuration { name, value });
            }
        }

        let non_negative = [
            ("retry_base_delay", config.retry_base_delay),
            ("retry_max_delay", config.retry_max_delay),
            ("retry_jitter", config.retry_jitter),
            ("shutdown_grace_seconds", config.shutdown_grace_seconds),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidDuration { name, value });
            }
        }

        for (name, value) in positive.into_iter().chain(non_negative) {
            if value > MAX_DURATION_SECONDS {
                return Err(ConfigError::DurationTooLarge { name, value });
            }
        }

        if config.retry_base_delay > config.retry_max_delay {
            return Err(ConfigError::InvalidBackoff(
                config.retry_base_delay,
                config.retry_max_delay,
            ));
        }

        if config.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress(config.server.bind.clone()));
        }

        match config.store.kind {
            StoreKind::Sqlite => {
                if config.store.sqlite_path.is_empty() {
                    return Err(ConfigError::EmptyDatabasePath);
                }
                if config.store.max_connections == 0 {
                    return Err(ConfigError::InvalidMaxConnections(config.store.max_connections));
                }
            }
            StoreKind::Redis => {
                if config.store.queue_name.is_empty() {
                    return Err(ConfigError::ValidationFailed(
                        "store.queue_name cannot be empty".to_string(),
                    ));
                }
            }
            StoreKind::Memory => {}
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
