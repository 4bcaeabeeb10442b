use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client as ReqwestClient, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::domain::models::{JsonMap, PlannedStep, ToolName};
use crate::domain::ports::{Tool, ToolError};

/// Characters of the response body kept in the output
pub const MAX_BODY_CHARS: usize = 4000;

/// Bytes read from the body before decoding; enough for
/// [`MAX_BODY_CHARS`] characters of any UTF-8 text
const MAX_BODY_BYTES: usize = MAX_BODY_CHARS * 4;

/// Redirects followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// The `http_get` tool.
///
/// Output: `{"status_code": u16, "headers": {name: value}, "text": str}` with
/// `text` cut to [`MAX_BODY_CHARS`]. Any status code is a successful call;
/// only transport failures are errors.
pub struct HttpGetTool {
    http_client: ReqwestClient,
}

impl HttpGetTool {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let http_client = ReqwestClient::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    fn parse_url(raw: &str) -> Result<Url, ToolError> {
        let url = Url::parse(raw).map_err(|e| ToolError::InvalidInput(format!("invalid url '{raw}': {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ToolError::InvalidInput(format!("unsupported url scheme '{other}'"))),
        }
    }

    /// Read at most [`MAX_BODY_BYTES`] of the body, dropping the rest of the
    /// stream unread.
    async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>, ToolError> {
        let mut body = Vec::new();
        while body.len() < MAX_BODY_BYTES {
            let Some(chunk) = response.chunk().await.map_err(|e| ToolError::Http(e.to_string()))? else {
                break;
            };
            let room = MAX_BODY_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
        Ok(body)
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> ToolName {
        ToolName::HttpGet
    }

    async fn execute(&self, step: &PlannedStep) -> Result<JsonMap, ToolError> {
        let PlannedStep::HttpGet { url } = step else {
            return Err(ToolError::WrongStep {
                tool: ToolName::HttpGet.to_string(),
                got: step.tool().to_string(),
            });
        };
        let url = Self::parse_url(url)?;

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;

        let status = response.status();
        let mut headers = JsonMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            // Repeated headers are folded into one comma-separated value.
            match headers.get_mut(name.as_str()) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                _ => {
                    headers.insert(name.as_str().to_string(), Value::String(value));
                }
            }
        }

        let body = Self::read_capped(response).await?;
        let text: String = String::from_utf8_lossy(&body).chars().take(MAX_BODY_CHARS).collect();
        debug!(%url, status = status.as_u16(), body_chars = text.chars().count(), "http_get completed");

        let mut output = JsonMap::new();
        output.insert("status_code".into(), json!(status.as_u16()));
        output.insert("headers".into(), Value::Object(headers));
        output.insert("text".into(), Value::String(text));
        Ok(output)
    }
}
