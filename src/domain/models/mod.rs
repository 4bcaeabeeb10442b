//! Domain models.

pub mod config;
pub mod plan;
pub mod step;
pub mod task;

pub use config::{
    Config, LoggingConfig, PlannerConfig, PlannerKind, ServerConfig, StoreConfig, StoreKind,
    ToolsConfig,
};
pub use plan::{PlannedStep, PlannedStepError, ToolName};
pub use step::{JsonMap, NewStep, StepKind, StepRecord};
pub use task::{Task, TaskStatus, TaskUpdate};
