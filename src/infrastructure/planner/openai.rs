use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::models::{PlannedStep, PlannedStepError, PlannerConfig, ToolName};
use crate::domain::ports::{Planner, PlannerError};

const PLAN_FUNCTION: &str = "plan_steps";

/// Configuration for the OpenAI-compatible planner
#[derive(Debug, Clone)]
pub struct OpenAiPlannerConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Step limit stated in the prompt; the worker enforces the real cap
    pub max_steps: usize,
}

impl OpenAiPlannerConfig {
    pub fn from_config(config: &PlannerConfig, max_steps: usize) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            timeout: Duration::from_secs_f64(config.timeout_seconds),
            max_steps,
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: String,
    tools: Vec<Value>,
    tool_choice: &'static str,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PlanArguments {
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Planner backed by an OpenAI-compatible `/responses` endpoint.
///
/// The model is forced to answer through a single `plan_steps` function whose
/// schema only admits the known tool names.
pub struct OpenAiPlanner {
    http_client: ReqwestClient,
    config: OpenAiPlannerConfig,
}

impl OpenAiPlanner {
    pub fn new(config: OpenAiPlannerConfig) -> Result<Self, PlannerError> {
        let http_client = ReqwestClient::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn plan_tool_schema() -> Value {
        let names: Vec<&str> = ToolName::ALL.iter().map(ToolName::as_str).collect();
        json!({
            "type": "function",
            "name": PLAN_FUNCTION,
            "description": "Create a short plan of tool calls that achieves the goal.",
            "parameters": {
                "type": "object",
                "properties": {
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "tool": {"type": "string", "enum": names},
                                "args": {"type": "object"}
                            },
                            "required": ["tool", "args"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["steps"],
                "additionalProperties": false
            }
        })
    }

    fn prompt(&self, goal: &str) -> String {
        format!(
            "You are a planner for a backend agent.\n\
             Return only via the `{PLAN_FUNCTION}` function.\n\
             Allowed tools:\n\
             - http_get: {{\"url\": string}}\n\
             - calc: {{\"expr\": string}} (arithmetic only)\n\
             Constraints:\n\
             - at most {} steps\n\
             - if no tool is needed, return steps=[]\n\
             Goal: {goal}",
            self.config.max_steps
        )
    }

    /// Pull the plan out of a `/responses` body.
    fn parse_plan(response: ResponsesResponse) -> Result<Vec<PlannedStep>, PlannerError> {
        let Some(call) = response
            .output
            .into_iter()
            .find(|item| item.kind == "function_call" && item.name.as_deref() == Some(PLAN_FUNCTION))
        else {
            debug!("Model returned no plan_steps call, treating as empty plan");
            return Ok(Vec::new());
        };

        // `arguments` is a JSON-encoded string in the Responses API, but
        // compatible servers sometimes inline the object.
        let arguments: PlanArguments = match call.arguments.unwrap_or(Value::Null) {
            Value::String(raw) => serde_json::from_str(&raw),
            Value::Null => Ok(PlanArguments { steps: Vec::new() }),
            other => serde_json::from_value(other),
        }
        .map_err(|e| PlannerError::MalformedPlan(format!("bad {PLAN_FUNCTION} arguments: {e}")))?;

        arguments
            .steps
            .into_iter()
            .map(|raw| {
                PlannedStep::from_parts(&raw.tool, raw.args).map_err(|e| match e {
                    PlannedStepError::UnknownTool(name) => PlannerError::UnknownTool(name),
                    invalid => PlannerError::MalformedPlan(invalid.to_string()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    fn name(&self) -> &str {
        "openai_planner"
    }

    #[instrument(skip(self, goal), fields(model = %self.config.model))]
    async fn plan(&self, goal: &str) -> Result<Vec<PlannedStep>, PlannerError> {
        let request = ResponsesRequest {
            model: &self.config.model,
            input: self.prompt(goal),
            tools: vec![Self::plan_tool_schema()],
            tool_choice: "required",
        };

        let mut builder = self
            .http_client
            .post(format!("{}/responses", self.config.base_url))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            warn!(status = status.as_u16(), "Planner request rejected");
            return Err(PlannerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ResponsesResponse = response.json().await?;
        let steps = Self::parse_plan(parsed)?;
        debug!(steps = steps.len(), "Plan received");
        Ok(steps)
    }
}
