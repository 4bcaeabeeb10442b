//! Planned tool invocations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::step::JsonMap;

/// Names of the tools a plan may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    HttpGet,
    Calc,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::HttpGet, ToolName::Calc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpGet => "http_get",
            Self::Calc => "calc",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_get" => Ok(Self::HttpGet),
            "calc" => Ok(Self::Calc),
            other => Err(other.to_string()),
        }
    }
}

/// One tool invocation in a plan.
///
/// Serialized as `{"tool": "<name>", "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum PlannedStep {
    HttpGet { url: String },
    Calc { expr: String },
}

impl PlannedStep {
    pub fn http_get(url: impl Into<String>) -> Self {
        Self::HttpGet { url: url.into() }
    }

    pub fn calc(expr: impl Into<String>) -> Self {
        Self::Calc { expr: expr.into() }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            Self::HttpGet { .. } => ToolName::HttpGet,
            Self::Calc { .. } => ToolName::Calc,
        }
    }

    /// The argument map recorded as the step's input.
    pub fn args(&self) -> JsonMap {
        let mut args = JsonMap::new();
        match self {
            Self::HttpGet { url } => {
                args.insert("url".into(), Value::String(url.clone()));
            }
            Self::Calc { expr } => {
                args.insert("expr".into(), Value::String(expr.clone()));
            }
        }
        args
    }

    /// Build a step from an untyped `{tool, args}` pair.
    ///
    /// An unrecognised tool name is returned as `Err(name)`; recognised tools
    /// with malformed arguments are reported the same way serde would.
    pub fn from_parts(tool: &str, args: Value) -> Result<Self, PlannedStepError> {
        let name: ToolName = tool
            .parse()
            .map_err(PlannedStepError::UnknownTool)?;
        let tagged = serde_json::json!({ "tool": name.as_str(), "args": args });
        serde_json::from_value(tagged).map_err(|e| PlannedStepError::InvalidArgs {
            tool: name,
            reason: e.to_string(),
        })
    }
}

/// Why an untyped plan entry could not become a [`PlannedStep`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannedStepError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: ToolName, reason: String },
}
