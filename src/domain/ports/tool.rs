use async_trait::async_trait;

use crate::domain::models::{JsonMap, PlannedStep, ToolName};
use crate::domain::ports::errors::ToolError;

/// A named operation with a uniform contract: a planned step in, an output
/// map out, or a [`ToolError`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    async fn execute(&self, step: &PlannedStep) -> Result<JsonMap, ToolError>;
}
