use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::{RelaySettings, RetryPolicy};
use crate::upstream::CompletionClientConfig;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Keep your answers concise and informative. Always respond in English.";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub bind: String,
    pub upstream_base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    #[serde(skip_serializing)]
    pub admin_code: Option<String>,
    pub static_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            upstream_base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 1000,
            admin_code: None,
            static_dir: None,
        }
    }
}

impl RelayConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to resolve variable names. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("RELAY_BIND") {
            cfg.bind = v;
        }
        if let Some(v) = get("UPSTREAM_BASE_URL") {
            cfg.upstream_base_url = v;
        }
        cfg.api_key = get("UPSTREAM_API_KEY").or_else(|| get("GROQ_API_KEY"));
        if let Some(v) = get("UPSTREAM_MODEL") {
            cfg.model = v;
        }
        if let Some(v) = get("UPSTREAM_TEMPERATURE") {
            cfg.temperature = parse("UPSTREAM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("UPSTREAM_MAX_TOKENS") {
            cfg.max_tokens = parse("UPSTREAM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("RELAY_SYSTEM_PROMPT") {
            cfg.system_prompt = v;
        }
        if let Some(v) = get("UPSTREAM_TIMEOUT_SECS") {
            cfg.request_timeout_secs = parse("UPSTREAM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("RELAY_MAX_ATTEMPTS") {
            cfg.max_attempts = parse("RELAY_MAX_ATTEMPTS", &v)?;
            if cfg.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    var: "RELAY_MAX_ATTEMPTS",
                    value: v,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(v) = get("RELAY_RETRY_DELAY_MS") {
            cfg.retry_delay_ms = parse("RELAY_RETRY_DELAY_MS", &v)?;
        }
        cfg.admin_code = get("ADMIN_CODE");
        if let Some(v) = get("RELAY_STATIC_DIR") {
            cfg.static_dir = Some(PathBuf::from(v));
        }

        Ok(cfg)
    }

    pub fn upstream(&self) -> CompletionClientConfig {
        CompletionClientConfig {
            base_url: self.upstream_base_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    /// Human-readable summary with secrets masked.
    pub fn redacted_summary(&self) -> String {
        let static_dir = self
            .static_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        [
            format!("bind: {}", self.bind),
            format!("upstream_base_url: {}", self.upstream_base_url),
            format!("api_key: {}", redact_key(self.api_key.as_deref())),
            format!("model: {}", self.model),
            format!("temperature: {}", self.temperature),
            format!("max_tokens: {}", self.max_tokens),
            format!("request_timeout_secs: {}", self.request_timeout_secs),
            format!("max_attempts: {}", self.max_attempts),
            format!("retry_delay_ms: {}", self.retry_delay_ms),
            format!("admin_code: {}", presence(self.admin_code.as_deref())),
            format!("static_dir: {static_dir}"),
        ]
        .join("\n")
    }

    pub fn json_schema() -> String {
        let defaults = Self::default();
        let schema = serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": "Voice Relay Configuration",
            "type": "object",
            "properties": {
                "bind": { "type": "string", "default": defaults.bind, "env": "RELAY_BIND" },
                "upstream_base_url": {
                    "type": "string",
                    "default": defaults.upstream_base_url,
                    "env": "UPSTREAM_BASE_URL"
                },
                "api_key": {
                    "type": "string",
                    "writeOnly": true,
                    "env": ["UPSTREAM_API_KEY", "GROQ_API_KEY"]
                },
                "model": { "type": "string", "default": defaults.model, "env": "UPSTREAM_MODEL" },
                "temperature": {
                    "type": "number",
                    "default": defaults.temperature,
                    "env": "UPSTREAM_TEMPERATURE"
                },
                "max_tokens": {
                    "type": "integer",
                    "minimum": 1,
                    "default": defaults.max_tokens,
                    "env": "UPSTREAM_MAX_TOKENS"
                },
                "system_prompt": {
                    "type": "string",
                    "default": defaults.system_prompt,
                    "env": "RELAY_SYSTEM_PROMPT"
                },
                "request_timeout_secs": {
                    "type": "integer",
                    "default": defaults.request_timeout_secs,
                    "env": "UPSTREAM_TIMEOUT_SECS"
                },
                "max_attempts": {
                    "type": "integer",
                    "minimum": 1,
                    "default": defaults.max_attempts,
                    "env": "RELAY_MAX_ATTEMPTS"
                },
                "retry_delay_ms": {
                    "type": "integer",
                    "default": defaults.retry_delay_ms,
                    "env": "RELAY_RETRY_DELAY_MS"
                },
                "admin_code": { "type": "string", "writeOnly": true, "env": "ADMIN_CODE" },
                "static_dir": { "type": "string", "env": "RELAY_STATIC_DIR" }
            }
        });
        serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string())
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("bind", &self.bind)
            .field("upstream_base_url", &self.upstream_base_url)
            .field("api_key", &redact_key(self.api_key.as_deref()))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("admin_code", &presence(self.admin_code.as_deref()))
            .field("static_dir", &self.static_dir)
            .finish()
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Keys shorter than this are shown only as `(set)`.
const KEY_PREFIX_MIN_LEN: usize = 16;

/// Provider keys keep their short vendor prefix (`gsk_`, `sk-p`) so operators
/// can tell which account is wired in; short keys reveal nothing.
fn redact_key(key: Option<&str>) -> String {
    match key {
        None => "(unset)".to_string(),
        Some(k) if k.chars().count() < KEY_PREFIX_MIN_LEN => "(set)".to_string(),
        Some(k) => {
            let prefix: String = k.chars().take(4).collect();
            format!("{prefix}***")
        }
    }
}

/// Whether a secret is configured, revealing none of it.
fn presence(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "(set)",
        None => "(unset)",
    }
}
