//! Client for OpenAI-compatible chat completion endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{GenerateOptions, LlmClient, LlmResponse, ProviderConfig, ProviderError, TokenCount};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    token_ids: Vec<Value>,
}

/// Talks to any `/chat/completions` endpoint (xAI Grok, OpenAI).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Creates a client for `config`.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}{path}")
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured(format!("no API key for {}", self.config.provider)))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn provider_name(&self) -> &str {
        &self.config.provider
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_available(&self) -> bool {
        self.api_key().is_ok()
    }

    async fn generate_chat(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, ProviderError> {
        let api_key = self.api_key()?;

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: options.temperature.unwrap_or(self.config.temperature),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
        };

        debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            "Sending chat completion request"
        );

        let mut builder = self
            .http
            .post(self.url("/chat/completions"))
            .bearer_auth(api_key)
            .json(&request);
        if let Some(timeout) = options.timeout() {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                // Sub-millisecond precision is irrelevant for a backoff hint.
                .map(|secs| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let ms = (secs * 1000.0) as u64;
                    ms
                });
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = %self.config.provider,
                status = status.as_u16(),
                "Provider returned an error status"
            );
            return Err(ProviderError::from_status(status.as_u16(), body, retry_after_ms));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?;
        let text = choice.message.content.unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();

        let mut result = LlmResponse::new(
            text,
            &self.config.provider,
            parsed.model.unwrap_or_else(|| self.config.model.clone()),
        )
        .with_usage(usage.prompt_tokens, usage.completion_tokens);
        if usage.total_tokens > 0 {
            result.tokens_used = usage.total_tokens;
        }
        if let Some(id) = parsed.id {
            result = result.with_metadata("response_id", id);
        }
        if let Some(reason) = choice.finish_reason {
            result = result.with_metadata("finish_reason", reason);
        }
        Ok(result)
    }

    async fn count_tokens(&self, text: &str) -> TokenCount {
        let Ok(api_key) = self.api_key() else {
            return TokenCount::estimate(text);
        };

        let request = TokenizeRequest {
            model: &self.config.model,
            text,
        };
        let response = self
            .http
            .post(self.url("/tokenize-text"))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<TokenizeResponse>().await {
                    Ok(parsed) => TokenCount::exact(parsed.token_ids.len() as u64),
                    Err(_) => TokenCount::estimate(text),
                }
            }
            _ => {
                debug!(provider = %self.config.provider, "Token endpoint unavailable, estimating");
                TokenCount::estimate(text)
            }
        }
    }
}
