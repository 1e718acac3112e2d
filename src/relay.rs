//! Chat relay with bounded retry.
//!
//! One call to [`RelayHandler::handle`] is one logical request: however many
//! upstream attempts it takes, it produces exactly one request-counter update
//! and exactly one conversation record.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::health::{ErrorInfo, HealthSnapshot};
use crate::monitor::Monitor;
use crate::upstream::{reply_text, ChatMessage, CompletionRequest, Upstream, UpstreamError};

/// Stored as the AI response when a request ultimately fails.
pub const FAILURE_PLACEHOLDER: &str =
    "Sorry, something went wrong while contacting the AI service.";

/// Error-record context for failed chat relays.
pub const API_REQUEST_CONTEXT: &str = "api_request";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Incoming chat request. Optional fields override the configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Upstream payload defaults and the fixed system instruction.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub system_prompt: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never zero.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The body could not be decoded as a chat request.
    #[error("invalid chat request: {0}")]
    InvalidRequest(String),
    #[error("messages must contain at least one entry")]
    EmptyMessages,
    #[error("Failed to connect to AI service")]
    Upstream {
        source: UpstreamError,
        health: HealthSnapshot,
    },
}

// ---------------------------------------------------------------------------
// RelayHandler
// ---------------------------------------------------------------------------

pub struct RelayHandler {
    upstream: Arc<dyn Upstream>,
    monitor: Monitor,
    settings: RelaySettings,
    retry: RetryPolicy,
}

impl RelayHandler {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        monitor: Monitor,
        settings: RelaySettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            upstream,
            monitor,
            settings,
            retry,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Relay one chat request and return the upstream payload verbatim.
    pub async fn handle(&self, request: ChatRequest) -> Result<Value, RelayError> {
        let user_input = match request.messages.last() {
            Some(last) => last.content.clone(),
            None => return Err(RelayError::EmptyMessages),
        };

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("chat", %request_id, upstream = self.upstream.name());
        async move {
            let completion = self.build_completion(request);
            self.monitor.log().info(format!(
                "Chat request received ({} messages)",
                completion.messages.len() - 1
            ));

            match self.call_with_retry(&completion).await {
                Ok((payload, reply, attempts)) => {
                    self.monitor.record_success(&user_input, &reply);
                    self.monitor.log().info(format!(
                        "Upstream replied after {attempts} attempt(s)"
                    ));
                    Ok(payload)
                }
                Err(err) => {
                    let health = self.monitor.record_failure(
                        &user_input,
                        FAILURE_PLACEHOLDER,
                        ErrorInfo::from(&err),
                        API_REQUEST_CONTEXT,
                    );
                    Err(RelayError::Upstream { source: err, health })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Swap any caller system messages for the configured instruction.
    fn build_completion(&self, request: ChatRequest) -> CompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(self.settings.system_prompt.clone()));
        messages.extend(request.messages.into_iter().filter(|m| !m.is_system()));

        CompletionRequest {
            messages,
            model: request.model.unwrap_or_else(|| self.settings.model.clone()),
            temperature: request.temperature.unwrap_or(self.settings.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.settings.max_tokens),
        }
    }

    async fn call_with_retry(
        &self,
        completion: &CompletionRequest,
    ) -> Result<(Value, String, u32), UpstreamError> {
        let mut attempt = 1;
        loop {
            let outcome = self.upstream.complete(completion).await.and_then(|payload| {
                let reply = reply_text(&payload)?.to_string();
                Ok((payload, reply))
            });

            match outcome {
                Ok((payload, reply)) => return Ok((payload, reply, attempt)),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    self.monitor.log().warning(format!(
                        "Upstream attempt {attempt}/{} failed: {err}; retrying in {}ms",
                        self.retry.max_attempts,
                        self.retry.delay.as_millis()
                    ));
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::debug!(attempt, kind = err.kind(), "giving up on upstream");
                    return Err(err);
                }
            }
        }
    }
}

impl std::fmt::Debug for RelayHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandler")
            .field("upstream", &self.upstream.name())
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
