use async_trait::async_trait;

use crate::domain::models::PlannedStep;
use crate::domain::ports::errors::PlannerError;

/// Maps a goal to an ordered list of tool invocations.
///
/// Returns an empty plan when no tool is needed. Planners do not truncate;
/// the worker rejects plans longer than the configured cap.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Identifier recorded as the name of the plan step.
    fn name(&self) -> &str;

    async fn plan(&self, goal: &str) -> Result<Vec<PlannedStep>, PlannerError>;
}
