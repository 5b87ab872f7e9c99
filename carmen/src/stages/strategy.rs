//! How a stage produces its output: live through the breaker, or locally.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{parse::extract_json_object, schema, StageError, StageSettings};
use crate::breaker::{BreakerError, CircuitBreaker};
use crate::context::StageContext;
use crate::core::{JsonObject, StageId};
use crate::fallback::FallbackProvider;
use crate::llm::{GenerateOptions, LlmClient, LlmResponse};

/// What a strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    /// The validated payload.
    pub output: JsonObject,
    /// Tokens the provider reported for the call; zero for local output or
    /// when the provider sent no usage.
    pub tokens_used: u64,
    /// Local estimate of the response size, set only when the provider
    /// reported no usage.
    pub estimated_tokens: Option<u64>,
    /// Provider that answered, for live output.
    pub provider: Option<String>,
    /// Model that answered, for live output.
    pub model: Option<String>,
}

/// Everything a strategy needs to know about the stage it serves.
#[derive(Debug, Clone, Copy)]
pub struct StrategyRequest<'a> {
    /// The stage.
    pub stage: StageId,
    /// Raw user input.
    pub input: &'a str,
    /// Stage context.
    pub context: &'a StageContext,
    /// Stage settings.
    pub settings: &'a StageSettings,
    /// Effective stage options.
    pub options: &'a JsonObject,
}

/// A way of producing stage output.
#[async_trait]
pub trait StageStrategy: Send + Sync + fmt::Debug {
    /// Short name recorded in result metadata.
    fn name(&self) -> &'static str;

    /// Produces the output for one run of the stage.
    async fn produce(&self, request: StrategyRequest<'_>) -> Result<StrategyOutput, StageError>;
}

/// Calls the provider through the circuit breaker and validates the answer.
#[derive(Clone)]
pub struct LiveStrategy {
    client: Arc<dyn LlmClient>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl LiveStrategy {
    /// Creates a live strategy without a breaker.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            breaker: None,
        }
    }

    /// Guards calls with `breaker`.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Returns the client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    /// Returns the breaker, if any.
    #[must_use]
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Whether the client can be called.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client.is_available()
    }

    async fn call(
        &self,
        request: &StrategyRequest<'_>,
        system: &str,
        user: &str,
    ) -> Result<(LlmResponse, Option<JsonObject>), StageError> {
        let stage = request.stage;
        let mut options = GenerateOptions::new()
            .with_temperature(
                request
                    .settings
                    .temperature
                    .unwrap_or_else(|| schema::default_temperature(stage)),
            );
        if let Some(max_tokens) = request.settings.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(breaker) = &self.breaker {
            options = options.with_timeout(breaker.config().request_timeout());
        }

        // With the flag set, parsing happens inside the guarded call so a
        // malformed answer is recorded as a breaker failure.
        let validate_inside = request.settings.malformed_counts_as_failure;
        let client = &self.client;
        let options = &options;
        let stage_options = request.options;
        let attempt = move || async move {
            let response = client
                .generate_chat(system, user, options)
                .await
                .map_err(|source| StageError::Provider { stage, source })?;
            let parsed = if validate_inside {
                Some(parse_and_validate(stage, &response.text, stage_options)?)
            } else {
                None
            };
            Ok::<_, StageError>((response, parsed))
        };

        match &self.breaker {
            Some(breaker) => breaker.call(attempt).await.map_err(|e| match e {
                BreakerError::Open { retry_after_secs } => StageError::CircuitOpen {
                    stage,
                    retry_after_secs,
                },
                BreakerError::Inner(inner) => inner,
            }),
            None => attempt().await,
        }
    }
}

impl fmt::Debug for LiveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStrategy")
            .field("provider", &self.client.provider_name())
            .field("model", &self.client.model_name())
            .field("breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

#[async_trait]
impl StageStrategy for LiveStrategy {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn produce(&self, request: StrategyRequest<'_>) -> Result<StrategyOutput, StageError> {
        let stage = request.stage;
        let system = schema::system_prompt(stage, request.options);
        let user = request.context.render_user_prompt(request.input);

        debug!(stage = %stage, provider = %self.client.provider_name(), "Calling provider");
        let (response, parsed) = self.call(&request, &system, &user).await?;
        let output = match parsed {
            Some(output) => output,
            None => parse_and_validate(stage, &response.text, request.options).inspect_err(|e| {
                warn!(stage = %stage, error = %e, "Malformed output outside breaker accounting");
            })?,
        };

        let estimated_tokens =
            (response.tokens_used == 0).then(|| crate::llm::estimate_tokens(&response.text));
        Ok(StrategyOutput {
            output,
            tokens_used: response.tokens_used,
            estimated_tokens,
            provider: Some(response.provider),
            model: Some(response.model),
        })
    }
}

fn parse_and_validate(stage: StageId, text: &str, options: &JsonObject) -> Result<JsonObject, StageError> {
    let mut output = extract_json_object(text).map_err(|reason| StageError::malformed(stage, reason))?;
    schema::validate_output(stage, &mut output, options)
        .map_err(|reason| StageError::malformed(stage, reason))?;
    Ok(output)
}

/// Produces output locally from the fallback provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackStrategy {
    provider: FallbackProvider,
}

impl FallbackStrategy {
    /// Creates a fallback strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StageStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn produce(&self, request: StrategyRequest<'_>) -> Result<StrategyOutput, StageError> {
        let visible = request.context.visible_outputs();
        Ok(StrategyOutput {
            output: self.provider.fallback_for(request.stage, request.input, &visible),
            tokens_used: 0,
            estimated_tokens: None,
            provider: None,
            model: None,
        })
    }
}
