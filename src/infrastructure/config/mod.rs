//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment: programmatic defaults, then an
//! optional YAML file, then `APP_*` environment overrides. The merged result
//! is validated before use.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, DEFAULT_CONFIG_FILE, ENV_PREFIX};
