//! Retry policy with rate-limit backoff and per-attempt timeouts.
//!
//! Rate-limited calls back off exponentially, authentication and request
//! errors surface at once, and every other transport error gets a single
//! extra attempt after a fixed delay. All of it fits inside one attempt
//! budget.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{GenerateOptions, LlmClient, LlmResponse, ProviderError, RetryClass, TokenCount};

/// Backoff strategy for rate-limit delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first.
    pub max_attempts: usize,
    /// First rate-limit delay in milliseconds.
    pub base_delay_ms: u64,
    /// Cap for any single delay in milliseconds.
    pub max_delay_ms: u64,
    /// Fixed delay before the transient-error retry, in milliseconds.
    pub transient_delay_ms: u64,
    /// Extra attempts granted to transient errors.
    pub max_transient_retries: usize,
    /// Backoff strategy for rate limits.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy for rate limits.
    pub jitter_strategy: JitterStrategy,
    /// Wait at least as long as the provider's `Retry-After` hint.
    pub honor_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            transient_delay_ms: 2000,
            max_transient_retries: 1,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::None,
            honor_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base rate-limit delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the transient-error delay.
    #[must_use]
    pub fn with_transient_delay_ms(mut self, delay: u64) -> Self {
        self.transient_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Delay before rate-limit retry number `retry` (0-indexed).
    #[must_use]
    pub fn rate_limit_delay(&self, retry: u32, retry_after_ms: Option<u64>) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)).min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        let hinted = match retry_after_ms {
            Some(hint) if self.honor_retry_after => jittered.max(hint.min(max)),
            _ => jittered,
        };
        Duration::from_millis(hinted)
    }

    /// Delay before the transient-error retry.
    #[must_use]
    pub fn transient_delay(&self) -> Duration {
        Duration::from_millis(self.transient_delay_ms.min(self.max_delay_ms))
    }
}

/// Wraps a client with the retry and timeout rules.
#[derive(Debug, Clone)]
pub struct RetryPolicy<C> {
    inner: C,
    config: RetryConfig,
    default_timeout: Duration,
}

impl<C: LlmClient> RetryPolicy<C> {
    /// Wraps `inner` with a 30 second default timeout.
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            default_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the timeout used when the call options carry none.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    async fn attempt(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
        timeout: Duration,
    ) -> Result<LlmResponse, ProviderError> {
        // Dropping the timed-out future aborts the request and frees its connection.
        match tokio::time::timeout(timeout, self.inner.generate_chat(system, user, options)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryPolicy<C> {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn generate_chat(
        &self,
        system: &str,
        user: &str,
        options: &GenerateOptions,
    ) -> Result<LlmResponse, ProviderError> {
        if user.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("prompt must not be empty".to_string()));
        }

        let timeout = options.timeout().unwrap_or(self.default_timeout);
        let mut attempt = 0usize;
        let mut rate_limit_retries = 0u32;
        let mut transient_retries = 0usize;

        loop {
            attempt += 1;
            let err = match self.attempt(system, user, options, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let delay = match err.retry_class() {
                RetryClass::Fatal => return Err(err),
                _ if attempt >= self.config.max_attempts => {
                    warn!(
                        provider = %self.inner.provider_name(),
                        attempts = attempt,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }
                RetryClass::RateLimited => {
                    let hint = match &err {
                        ProviderError::RateLimited { retry_after_ms } => *retry_after_ms,
                        _ => None,
                    };
                    let delay = self.config.rate_limit_delay(rate_limit_retries, hint);
                    rate_limit_retries += 1;
                    delay
                }
                RetryClass::Transient => {
                    if transient_retries >= self.config.max_transient_retries {
                        return Err(err);
                    }
                    transient_retries += 1;
                    self.config.transient_delay()
                }
            };

            debug!(
                provider = %self.inner.provider_name(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying provider call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn count_tokens(&self, text: &str) -> TokenCount {
        self.inner.count_tokens(text).await
    }
}
