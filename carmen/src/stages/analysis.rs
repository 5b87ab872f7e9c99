//! The concrete stage used for all five CARMEN analyses.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};

use super::{
    schema, FallbackStrategy, LiveStrategy, Stage, StageDescriptor, StageError, StageSettings,
    StageStrategy, StrategyRequest,
};
use crate::context::{ExecutionMode, StageContext};
use crate::core::{JsonObject, StageResult};
use crate::errors::PipelineValidationError;

/// One analysis stage: a live strategy when a usable client is wired in,
/// the fallback strategy otherwise or whenever the live call fails.
#[derive(Debug, Clone)]
pub struct AnalysisStage {
    descriptor: StageDescriptor,
    settings: StageSettings,
    options: JsonObject,
    live: Option<LiveStrategy>,
    fallback: FallbackStrategy,
}

impl AnalysisStage {
    /// Creates a stage with default settings and no live client.
    pub fn new(descriptor: StageDescriptor) -> Result<Self, PipelineValidationError> {
        Self::with_settings(descriptor, StageSettings::default())
    }

    /// Creates a stage, validating its option overrides.
    pub fn with_settings(
        descriptor: StageDescriptor,
        settings: StageSettings,
    ) -> Result<Self, PipelineValidationError> {
        let options = schema::effective_options(descriptor.id, &settings.options)?;
        Ok(Self {
            descriptor,
            settings,
            options,
            live: None,
            fallback: FallbackStrategy::new(),
        })
    }

    /// Wires in the live strategy.
    #[must_use]
    pub fn with_live(mut self, live: LiveStrategy) -> Self {
        self.live = Some(live);
        self
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Returns the effective options (defaults merged with overrides).
    #[must_use]
    pub fn options(&self) -> &JsonObject {
        &self.options
    }

    /// Returns the live strategy, if wired.
    #[must_use]
    pub fn live(&self) -> Option<&LiveStrategy> {
        self.live.as_ref()
    }

    fn select_live(&self, ctx: &StageContext) -> Result<&LiveStrategy, String> {
        if ctx.mode() == ExecutionMode::FallbackOnly {
            return Err("processing time budget exhausted, fallback-only mode".to_string());
        }
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| "LLM client not provided".to_string())?;
        if live.is_available() {
            Ok(live)
        } else {
            Err(format!("LLM client {} not available", live.client().provider_name()))
        }
    }

    async fn degrade(&self, request: StrategyRequest<'_>, reason: String) -> Result<StageResult, StageError> {
        let id = request.stage;
        if !request.context.fallback_enabled() {
            warn!(stage = %id, reason = %reason, "Fallback disabled, recording failure");
            return Ok(StageResult::failure(id, reason));
        }
        let produced = self.fallback.produce(request).await?;
        Ok(StageResult::fallback(id, produced.output, reason).with_metadata("strategy", self.fallback.name()))
    }
}

#[async_trait]
impl Stage for AnalysisStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    async fn run(&self, input: &str, ctx: &StageContext) -> Result<StageResult, StageError> {
        let started = Instant::now();
        let id = self.id();
        let request = StrategyRequest {
            stage: id,
            input,
            context: ctx,
            settings: &self.settings,
            options: &self.options,
        };

        let result = match self.select_live(ctx) {
            Ok(live) => match live.produce(request).await {
                Ok(produced) => {
                    let mut result = StageResult::success(id, produced.output, produced.tokens_used)
                        .with_metadata("strategy", live.name());
                    if let Some(provider) = produced.provider {
                        result = result.with_metadata("provider", provider);
                    }
                    if let Some(model) = produced.model {
                        result = result.with_metadata("model", model);
                    }
                    if let Some(estimate) = produced.estimated_tokens {
                        result = result
                            .with_metadata("tokens_estimated", true)
                            .with_metadata("estimated_tokens", estimate);
                    }
                    result
                }
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    warn!(stage = %id, error = %e, "Live call failed, using fallback");
                    self.degrade(request, e.to_string()).await?
                }
            },
            Err(reason) => {
                info!(stage = %id, reason = %reason, "Using fallback");
                self.degrade(request, reason).await?
            }
        };

        let visible: Vec<Value> = ctx
            .visible_outputs()
            .keys()
            .map(|stage| Value::String(stage.to_string()))
            .collect();
        let degraded: Vec<Value> = ctx
            .inputs()
            .degraded()
            .map(|d| Value::String(d.stage.to_string()))
            .collect();

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut result = result
            .with_elapsed_ms(elapsed_ms)
            .with_metadata("context_stages", visible);
        if !degraded.is_empty() {
            result = result.with_metadata("degraded_dependencies", degraded);
        }
        Ok(result)
    }
}
