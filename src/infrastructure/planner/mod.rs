//! Planner strategies.

pub mod openai;
pub mod rules;

pub use openai::{OpenAiPlanner, OpenAiPlannerConfig};
pub use rules::RuleBasedPlanner;
