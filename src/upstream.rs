//! Upstream chat-completion API.
//!
//! Defines the [`Upstream`] seam the relay calls through, plus a `reqwest`
//! client for OpenAI-compatible `/chat/completions` endpoints (Groq,
//! OpenAI, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::health::ErrorInfo;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Role reserved for the relay's own instruction message.
pub const SYSTEM_ROLE: &str = "system";

/// A single message within a chat request. Roles other than `system` are
/// forwarded untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_ROLE, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Whether this message carries a system instruction.
    pub fn is_system(&self) -> bool {
        self.role.eq_ignore_ascii_case(SYSTEM_ROLE)
    }
}

/// Body sent to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an upstream call failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request timed out: {0}")]
    Timeout(String),
    #[error("upstream connection failed: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}")]
    Status { status: u16, body: Value },
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// Transport-level failures are worth another attempt; a reply we could
    /// not understand will not improve by asking again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UpstreamError::Malformed(_))
    }

    /// Short, stable name used as the error record type.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Transport(_) => "network",
            UpstreamError::Status { .. } => "http_status",
            UpstreamError::Malformed(_) => "malformed_response",
        }
    }

    /// Caller-facing detail: the upstream error body when there is one,
    /// otherwise the error message.
    pub fn details(&self) -> Value {
        match self {
            UpstreamError::Status { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

impl From<&UpstreamError> for ErrorInfo {
    fn from(err: &UpstreamError) -> Self {
        ErrorInfo::new(err.kind(), err.to_string())
    }
}

/// Extract `choices[0].message.content` from a completion payload.
pub fn reply_text(payload: &Value) -> Result<&str, UpstreamError> {
    payload
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or_else(|| UpstreamError::Malformed("no choices[0].message.content".to_string()))
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A chat-completion backend.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Perform one completion attempt and return the raw JSON payload.
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, UpstreamError>;
}

// ---------------------------------------------------------------------------
// CompletionClient
// ---------------------------------------------------------------------------

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct CompletionClientConfig {
    /// Base URL up to, not including, `/chat/completions`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Budget for a single attempt, connect through body.
    pub timeout: Duration,
}

impl std::fmt::Debug for CompletionClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `reqwest`-backed client for `POST {base_url}/chat/completions`.
#[derive(Debug)]
pub struct CompletionClient {
    config: CompletionClientConfig,
    client: reqwest::Client,
}

impl CompletionClient {
    pub fn new(config: CompletionClientConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Upstream for CompletionClient {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Value, UpstreamError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .timeout(self.config.timeout)
            .json(request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(UpstreamError::from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(UpstreamError::from_reqwest)?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Malformed(format!("response is not JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
