//! The provider client seam.

use async_trait::async_trait;

use super::{GenerateOptions, LlmResponse, ProviderError, TokenCount};

/// A client for one text-generation provider.
///
/// Implementations perform a single request/response exchange per call;
/// retries and timeouts are layered on by [`super::RetryPolicy`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name used for breaker and cache keys.
    fn provider_name(&self) -> &str;

    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Whether the client can be called at all (e.g. has credentials).
    fn is_available(&self) -> bool {
        true
    }

    /// Sends a system and user prompt pair.
    async fn generate_chat(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, ProviderError>;

    /// Sends a single prompt.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<LlmResponse, ProviderError> {
        self.generate_chat("", prompt, options).await
    }

    /// Counts tokens, falling back to the local estimate.
    async fn count_tokens(&self, text: &str) -> TokenCount {
        TokenCount::estimate(text)
    }
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for std::sync::Arc<T> {
    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    async fn generate_chat(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, ProviderError> {
        (**self).generate_chat(system, user, options).await
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<LlmResponse, ProviderError> {
        (**self).generate(prompt, options).await
    }

    async fn count_tokens(&self, text: &str) -> TokenCount {
        (**self).count_tokens(text).await
    }
}
