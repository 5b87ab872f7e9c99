//! Request options, responses and provider configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::core::JsonObject;

/// Per-call generation options. Unset fields use the client defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum completion tokens.
    pub max_tokens: Option<u32>,
    /// Timeout for one attempt, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl GenerateOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the completion token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the per-attempt timeout, if set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// A normalized provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub text: String,
    /// Total tokens billed for the call.
    pub tokens_used: u64,
    /// Prompt tokens.
    pub tokens_prompt: u64,
    /// Completion tokens.
    pub tokens_completion: u64,
    /// Provider name.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Provider-specific extras (finish reason, response id).
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub metadata: JsonObject,
}

impl LlmResponse {
    /// Creates a response with no usage figures.
    #[must_use]
    pub fn new(text: impl Into<String>, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_used: 0,
            tokens_prompt: 0,
            tokens_completion: 0,
            provider: provider.into(),
            model: model.into(),
            metadata: JsonObject::new(),
        }
    }

    /// Sets prompt and completion usage; the total is their sum, saturating
    /// at `u64::MAX`.
    #[must_use]
    pub fn with_usage(mut self, prompt: u64, completion: u64) -> Self {
        self.tokens_prompt = prompt;
        self.tokens_completion = completion;
        self.tokens_used = prompt.saturating_add(completion);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A token count and whether it was estimated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    /// Number of tokens.
    pub tokens: u64,
    /// True when computed by [`super::estimate_tokens`].
    pub estimated: bool,
}

impl TokenCount {
    /// A count reported by the provider.
    #[must_use]
    pub fn exact(tokens: u64) -> Self {
        Self {
            tokens,
            estimated: false,
        }
    }

    /// A local estimate.
    #[must_use]
    pub fn estimate(text: &str) -> Self {
        Self {
            tokens: super::estimate_tokens(text),
            estimated: true,
        }
    }
}

/// Connection settings for one provider client.
///
/// Hashing the serialized config gives the client cache key, so two stages
/// asking for identical settings share one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (`grok`, `openai`, `mock`).
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// API key, if the provider needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Default temperature.
    pub temperature: f32,
    /// Default completion token limit.
    pub max_tokens: u32,
    /// Default request timeout in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Creates a config with the stock defaults.
    #[must_use]
    pub fn new(provider: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 30,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the default request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Returns the default request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
