//! Step audit records.
//!
//! Every planning call and every tool execution appends exactly one record to
//! the owning task's step log. Records are never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object used for step inputs and outputs.
pub type JsonMap = Map<String, Value>;

/// What produced a step record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Plan,
    Tool,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Tool => "tool",
        }
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(Self::Plan),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown step kind: {other}")),
        }
    }
}

/// A persisted step, numbered by the store at append time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_no: u32,
    pub kind: StepKind,
    pub name: String,
    #[serde(default)]
    pub input: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonMap>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
    pub ts: DateTime<Utc>,
}

/// A step that has not been numbered yet.
///
/// Construct with [`NewStep::succeeded`] or [`NewStep::failed`] so that
/// `output` is present iff `ok` and `error` is present iff not `ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStep {
    pub kind: StepKind,
    pub name: String,
    pub input: JsonMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonMap>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
    pub ts: DateTime<Utc>,
}

impl NewStep {
    pub fn succeeded(
        kind: StepKind,
        name: impl Into<String>,
        input: JsonMap,
        output: JsonMap,
        latency_ms: u64,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            input,
            output: Some(output),
            ok: true,
            error: None,
            latency_ms,
            ts: Utc::now(),
        }
    }

    pub fn failed(
        kind: StepKind,
        name: impl Into<String>,
        input: JsonMap,
        error: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            input,
            output: None,
            ok: false,
            error: Some(error.into()),
            latency_ms,
            ts: Utc::now(),
        }
    }

    /// Attach the store-assigned step number.
    pub fn numbered(self, step_no: u32) -> StepRecord {
        StepRecord {
            step_no,
            kind: self.kind,
            name: self.name,
            input: self.input,
            output: self.output,
            ok: self.ok,
            error: self.error,
            latency_ms: self.latency_ms,
            ts: self.ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_failed_step_has_error_and_no_output() {
        let step = NewStep::failed(
            StepKind::Tool,
            "calc",
            map(json!({"expr": "1/0"})),
            "division by zero",
            3,
        )
        .numbered(2);

        assert_eq!(step.step_no, 2);
        assert!(!step.ok);
        assert!(step.output.is_none());
        assert_eq!(step.error.as_deref(), Some("division by zero"));

        let json = serde_json::to_value(&step).unwrap();
        assert!(json.get("output").is_none());
        assert_eq!(json["kind"], "tool");
    }

    #[test]
    fn test_record_deserializes_from_stored_json() {
        let raw = r#"{"step_no":1,"kind":"plan","name":"rule_planner","input":{"goal":"g"},
            "output":{"planned_steps":[]},"ok":true,"latency_ms":0,"ts":"2025-01-01T00:00:00Z"}"#;
        let step: StepRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(step.kind, StepKind::Plan);
        assert_eq!(step.output, Some(map(json!({"planned_steps": []}))));
        assert!(step.error.is_none());
    }
}
