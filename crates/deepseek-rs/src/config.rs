//! Client settings with the DeepSeek defaults.
//!
//! [`ClientConfig`] holds the fixed endpoint, model and per-attempt limits.
//! It can be overridden field by field with the `with_*` methods or loaded
//! from an optional JSON settings file. The API key lives outside the config:
//! callers resolve it (environment, settings file, command line) and check it
//! with [`has_api_key`] before sending.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::api::retry::RetryPolicy;
use crate::api::transport::AttemptTimeouts;
use crate::{DEEPSEEK_URL, DEFAULT_MODEL, USER_AGENT};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

/// Settings for a [`CompletionClient`](crate::CompletionClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Completions endpoint. Default: [`DEEPSEEK_URL`].
    pub endpoint: String,
    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,
    /// `User-Agent` header. Default: [`USER_AGENT`].
    pub user_agent: String,
    /// Connect deadline per attempt. Default: 45s.
    pub connect_timeout: Duration,
    /// Read deadline per attempt. Default: 120s.
    pub read_timeout: Duration,
    /// Attempts and backoff.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEEPSEEK_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            user_agent: USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(45),
            read_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn attempt_timeouts(&self) -> AttemptTimeouts {
        AttemptTimeouts {
            connect: self.connect_timeout,
            read: self.read_timeout,
        }
    }

    /// Load a JSON settings file on top of the defaults.
    ///
    /// Every field is optional; durations are in milliseconds:
    ///
    /// ```json
    /// {
    ///   "endpoint": "https://api.deepseek.com/chat/completions",
    ///   "model": "deepseek-chat",
    ///   "api_key": "sk-...",
    ///   "connect_timeout_ms": 45000,
    ///   "read_timeout_ms": 120000,
    ///   "max_attempts": 3
    /// }
    /// ```
    ///
    /// Returns the config and the file's `api_key`, if any.
    pub fn load(path: &Path) -> Result<(Self, Option<String>), String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read settings file '{}': {e}", path.display()))?;
        let file: SettingsFile = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse settings file '{}': {e}", path.display()))?;
        Ok(file.apply(Self::default()))
    }
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    read_timeout_ms: Option<u64>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    backoff_ms: Option<u64>,
    #[serde(default)]
    timeout_backoff_ms: Option<u64>,
}

impl SettingsFile {
    fn apply(self, mut config: ClientConfig) -> (ClientConfig, Option<String>) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = self.backoff_ms {
            config.retry.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.timeout_backoff_ms {
            config.retry.timeout_backoff_base = Duration::from_millis(ms);
        }
        (config, self.api_key)
    }
}

/// Whether `key` is present and not blank.
pub fn has_api_key(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.trim().is_empty())
}

/// Read the API key from [`API_KEY_ENV`], trimmed. Blank counts as unset.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}
