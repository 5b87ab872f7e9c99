//! Provider configuration and the client cache.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LlmClient, MockLlmClient, ProviderConfig, ProviderError, RetryConfig, RetryPolicy};

/// Providers that talk to a real endpoint and need an API key.
const KEYED_PROVIDERS: [&str; 2] = ["grok", "openai"];

/// Default generation settings shared by all providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmDefaults {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1000,
            timeout_secs: 30,
        }
    }
}

/// Provider selection and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used by stages that do not name one.
    pub default_provider: String,
    /// API keys by provider. Missing keys are read from `<PROVIDER>_API_KEY`.
    #[serde(skip_serializing)]
    pub api_keys: BTreeMap<String, String>,
    /// Model overrides by provider.
    pub models: BTreeMap<String, String>,
    /// Base URL overrides by provider.
    pub base_urls: BTreeMap<String, String>,
    /// Generation defaults.
    pub defaults: LlmDefaults,
    /// Whether to fall back to environment variables for API keys.
    pub read_env: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "grok".to_string(),
            api_keys: BTreeMap::new(),
            models: BTreeMap::new(),
            base_urls: BTreeMap::new(),
            defaults: LlmDefaults::default(),
            read_env: true,
        }
    }
}

impl LlmConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default provider.
    #[must_use]
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    /// Sets an API key.
    #[must_use]
    pub fn with_api_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider.into(), key.into());
        self
    }

    /// Sets a model override.
    #[must_use]
    pub fn with_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.models.insert(provider.into(), model.into());
        self
    }

    /// Enables or disables environment lookups for API keys.
    #[must_use]
    pub fn with_env_lookup(mut self, read_env: bool) -> Self {
        self.read_env = read_env;
        self
    }

    /// Resolves the API key for `provider`.
    #[must_use]
    pub fn api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .get(provider)
            .cloned()
            .or_else(|| {
                if self.read_env {
                    std::env::var(format!("{}_API_KEY", provider.to_ascii_uppercase())).ok()
                } else {
                    None
                }
            })
            .filter(|key| !key.trim().is_empty())
    }

    /// Builds the connection settings for `provider`.
    pub fn provider_config(&self, provider: &str) -> Result<ProviderConfig, ProviderError> {
        let provider = provider.to_ascii_lowercase();
        let (default_model, default_url) = match provider.as_str() {
            "grok" => ("grok-beta", "https://api.x.ai/v1"),
            "openai" => ("gpt-4", "https://api.openai.com/v1"),
            "mock" => ("mock-model", ""),
            _ => return Err(ProviderError::UnsupportedProvider(provider)),
        };

        let mut config = ProviderConfig::new(
            provider.as_str(),
            self.models.get(&provider).map_or(default_model, String::as_str),
            self.base_urls.get(&provider).map_or(default_url, String::as_str),
        )
        .with_timeout_secs(self.defaults.timeout_secs);
        config.temperature = self.defaults.temperature;
        config.max_tokens = self.defaults.max_tokens;
        config.api_key = self.api_key(&provider);
        Ok(config)
    }
}

/// Creates provider clients and caches them by `(provider, config hash)`.
///
/// Every client handed out is wrapped in a [`RetryPolicy`].
pub struct ClientFactory {
    config: LlmConfig,
    retry: RetryConfig,
    clients: DashMap<String, Arc<dyn LlmClient>>,
}

impl ClientFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new(config: LlmConfig, retry: RetryConfig) -> Self {
        Self {
            config,
            retry,
            clients: DashMap::new(),
        }
    }

    /// Returns the LLM configuration.
    #[must_use]
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Returns the configured default provider.
    #[must_use]
    pub fn default_provider(&self) -> &str {
        &self.config.default_provider
    }

    /// Returns the providers that have credentials.
    #[must_use]
    pub fn available_providers(&self) -> Vec<String> {
        KEYED_PROVIDERS
            .iter()
            .filter(|provider| self.config.api_key(provider).is_some())
            .map(|provider| (*provider).to_string())
            .collect()
    }

    /// Returns the client for `provider`, creating it on first use.
    pub fn create(&self, provider: &str) -> Result<Arc<dyn LlmClient>, ProviderError> {
        let config = self.config.provider_config(provider)?;
        self.create_with(config)
    }

    /// Returns the client for explicit connection settings.
    pub fn create_with(&self, config: ProviderConfig) -> Result<Arc<dyn LlmClient>, ProviderError> {
        let key = cache_key(&config)?;
        if let Some(client) = self.clients.get(&key) {
            debug!(provider = %config.provider, "Reusing cached client");
            return Ok(client.value().clone());
        }

        let client = self.build(config)?;
        Ok(self.clients.entry(key).or_insert(client).value().clone())
    }

    /// Number of cached clients.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.clients.len()
    }

    fn build(&self, config: ProviderConfig) -> Result<Arc<dyn LlmClient>, ProviderError> {
        let timeout = config.timeout();
        match config.provider.as_str() {
            "mock" => {
                let inner = MockLlmClient::new("mock", config.model.clone());
                Ok(Arc::new(RetryPolicy::new(inner, self.retry.clone()).with_default_timeout(timeout)))
            }
            "grok" | "openai" => {
                if config.api_key.is_none() {
                    return Err(ProviderError::NotConfigured(format!(
                        "{} API key not configured; set {}_API_KEY",
                        config.provider,
                        config.provider.to_ascii_uppercase()
                    )));
                }
                self.build_http(config, timeout)
            }
            other => Err(ProviderError::UnsupportedProvider(other.to_string())),
        }
    }

    #[cfg(feature = "http")]
    fn build_http(
        &self,
        config: ProviderConfig,
        timeout: std::time::Duration,
    ) -> Result<Arc<dyn LlmClient>, ProviderError> {
        info!(provider = %config.provider, model = %config.model, "Creating provider client");
        let inner = super::OpenAiCompatClient::new(config)?;
        Ok(Arc::new(RetryPolicy::new(inner, self.retry.clone()).with_default_timeout(timeout)))
    }

    #[cfg(not(feature = "http"))]
    fn build_http(
        &self,
        config: ProviderConfig,
        _timeout: std::time::Duration,
    ) -> Result<Arc<dyn LlmClient>, ProviderError> {
        info!(provider = %config.provider, "HTTP clients disabled at build time");
        Err(ProviderError::NotConfigured(format!(
            "{} requires the `http` feature",
            config.provider
        )))
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("default_provider", &self.config.default_provider)
            .field("cached", &self.clients.len())
            .finish()
    }
}

/// Cache key: provider name plus the SHA-256 of the serialized config.
fn cache_key(config: &ProviderConfig) -> Result<String, ProviderError> {
    let bytes = serde_json::to_vec(config)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{}_{}", config.provider, hex::encode(digest)))
}
