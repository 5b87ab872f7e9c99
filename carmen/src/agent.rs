//! The configured agent: stages, clients and breakers wired from a
//! [`CarmenConfig`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::breaker::{BreakerRegistry, BreakerSnapshot, Clock, CompositeBreakerObserver, LoggingBreakerObserver};
use crate::config::{CarmenConfig, StageConfig};
use crate::core::{JsonObject, StageId};
use crate::errors::CarmenError;
use crate::events::{EventSink, EventSinkObserver, NoOpEventSink};
use crate::llm::{ClientFactory, LlmClient, ProviderError};
use crate::persistence::{JsonlRunRecorder, NoOpRunRecorder, RunRecorder};
use crate::pipeline::{Pipeline, PipelineBuilder, ProcessOptions, RunResult};
use crate::stages::{AnalysisStage, LiveStrategy};
use crate::synthesis::ResponseSynthesizer;

/// Name given to the agent's pipeline.
pub const PIPELINE_NAME: &str = "carmen";

/// Builder for [`CarmenAgent`].
pub struct AgentBuilder {
    config: CarmenConfig,
    events: Option<Arc<dyn EventSink>>,
    recorder: Option<Arc<dyn RunRecorder>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AgentBuilder {
    /// Sends pipeline and breaker events to `events`. Breaker activity is
    /// still logged.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Records runs with `recorder` instead of the configured run log.
    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Drives breaker timing from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validates the configuration and wires the pipeline.
    pub async fn build(self) -> Result<CarmenAgent, CarmenError> {
        let Self {
            config,
            events,
            recorder,
            clock,
        } = self;
        config.validate()?;

        let recorder: Arc<dyn RunRecorder> = match (recorder, &config.logging.run_log) {
            (Some(recorder), _) => recorder,
            (None, Some(path)) => Arc::new(JsonlRunRecorder::open(path).await.map_err(|e| {
                CarmenError::Config(format!("cannot open run log {}: {e}", path.display()))
            })?),
            (None, None) => Arc::new(NoOpRunRecorder),
        };

        let mut breakers = BreakerRegistry::new(config.breaker.clone());
        if let Some(clock) = clock {
            breakers = breakers.with_clock(clock);
        }
        if let Some(events) = &events {
            breakers = breakers.with_observer(Arc::new(CompositeBreakerObserver::new(vec![
                Arc::new(LoggingBreakerObserver),
                Arc::new(EventSinkObserver::new(events.clone())),
            ])));
        }

        let factory = ClientFactory::new(config.llm.clone(), config.retry.clone());
        let mut builder = PipelineBuilder::new(PIPELINE_NAME)
            .early_exit(config.early_exit)
            .processing(config.processing.clone())
            .synthesizer(ResponseSynthesizer::new(config.output.clone()))
            .event_sink(events.unwrap_or_else(|| Arc::new(NoOpEventSink)))
            .recorder(recorder);

        for stage_id in StageId::ALL {
            let stage_config = config.stage(stage_id);
            let mut stage =
                AnalysisStage::with_settings(stage_config.descriptor(stage_id), stage_config.settings.clone())?;
            if stage_config.enabled {
                if let Some(client) = live_client(&factory, stage_id, &stage_config)? {
                    let breaker = breakers.get_or_create(client.provider_name());
                    stage = stage.with_live(LiveStrategy::new(client).with_breaker(breaker));
                }
            }
            builder.add_stage(Arc::new(stage))?;
        }

        let pipeline = builder.build()?;
        info!(
            pipeline = PIPELINE_NAME,
            stages = ?pipeline.schedule_ids(),
            providers = ?factory.available_providers(),
            "Agent ready"
        );

        Ok(CarmenAgent {
            config,
            factory,
            breakers,
            pipeline,
        })
    }
}

/// Resolves the client for a stage. A provider without credentials leaves
/// the stage on its fallback path.
fn live_client(
    factory: &ClientFactory,
    stage: StageId,
    stage_config: &StageConfig,
) -> Result<Option<Arc<dyn LlmClient>>, CarmenError> {
    let provider = stage_config
        .provider
        .as_deref()
        .unwrap_or_else(|| factory.default_provider());

    let created = match &stage_config.model {
        Some(model) => {
            let mut provider_config = factory.config().provider_config(provider)?;
            provider_config.model = model.clone();
            factory.create_with(provider_config)
        }
        None => factory.create(provider),
    };

    match created {
        Ok(client) => Ok(Some(client)),
        Err(ProviderError::NotConfigured(reason)) => {
            warn!(stage = %stage, provider = %provider, reason = %reason, "No live client, stage will use fallback");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// The five-stage analysis agent.
pub struct CarmenAgent {
    config: CarmenConfig,
    factory: ClientFactory,
    breakers: BreakerRegistry,
    pipeline: Pipeline,
}

impl CarmenAgent {
    /// Starts building an agent from `config`.
    #[must_use]
    pub fn builder(config: CarmenConfig) -> AgentBuilder {
        AgentBuilder {
            config,
            events: None,
            recorder: None,
            clock: None,
        }
    }

    /// Builds an agent with default wiring.
    pub async fn new(config: CarmenConfig) -> Result<Self, CarmenError> {
        Self::builder(config).build().await
    }

    /// Processes one input.
    pub async fn process(&self, input: &str, context: JsonObject, options: ProcessOptions) -> RunResult {
        self.pipeline.process(input, context, options).await
    }

    /// The configuration the agent was built from.
    #[must_use]
    pub fn config(&self) -> &CarmenConfig {
        &self.config
    }

    /// The wired pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The per-provider breakers.
    #[must_use]
    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Breaker state for every provider used so far.
    #[must_use]
    pub fn breaker_status(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }

    /// Providers with credentials.
    #[must_use]
    pub fn available_providers(&self) -> Vec<String> {
        self.factory.available_providers()
    }
}

impl std::fmt::Debug for CarmenAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarmenAgent")
            .field("pipeline", &self.pipeline.name())
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use crate::events::CollectingEventSink;
    use crate::llm::LlmConfig;
    use crate::persistence::MemoryRunRecorder;
    use pretty_assertions::assert_eq;

    fn offline_config() -> CarmenConfig {
        CarmenConfig::new().with_llm(LlmConfig::new().with_default_provider("mock").with_env_lookup(false))
    }

    #[tokio::test]
    async fn test_mock_provider_runs_live() {
        let agent = CarmenAgent::new(offline_config()).await.unwrap();

        let run = agent
            .process("I'm frustrated with this.", JsonObject::new(), ProcessOptions::new())
            .await;

        assert!(run.success);
        assert_eq!(run.success_flags, "11100");
        assert!(!run.used_fallback());
        assert!(run.total_tokens > 0);
        assert_eq!(agent.breaker_status().len(), 1);
        assert_eq!(agent.breaker_status()[0].name, "mock");
    }

    #[tokio::test]
    async fn test_missing_key_falls_back() {
        let config = CarmenConfig::new().with_llm(LlmConfig::new().with_env_lookup(false));
        let agent = CarmenAgent::new(config).await.unwrap();
        assert!(agent.available_providers().is_empty());

        let run = agent
            .process("I'm frustrated with this.", JsonObject::new(), ProcessOptions::new())
            .await;

        assert!(run.success);
        assert_eq!(run.success_flags, "FFF00");
        assert_eq!(run.fallback_stages(), vec![StageId::Agape, StageId::Eris, StageId::Metis]);
        assert!(agent.breaker_status().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_rejected() {
        let config = offline_config().with_stage(StageId::Eris, StageConfig::default().with_provider("hermes"));
        let err = CarmenAgent::new(config).await.unwrap_err();
        assert!(matches!(err, CarmenError::Provider(ProviderError::UnsupportedProvider(_))));
    }

    #[tokio::test]
    async fn test_optional_stages_enabled() {
        let config = offline_config()
            .with_stage(StageId::ThaliaRose, StageConfig::default().with_required(false))
            .with_stage(StageId::Thoth, StageConfig::default().with_required(false));
        let agent = CarmenAgent::new(config).await.unwrap();

        assert_eq!(agent.pipeline().schedule_ids(), StageId::ALL.to_vec());

        let run = agent
            .process("I'm frustrated with this.", JsonObject::new(), ProcessOptions::new())
            .await;
        assert_eq!(run.result(StageId::Thoth).map(|r| r.outcome), Some(StageOutcome::Success));
    }

    #[tokio::test]
    async fn test_builder_wires_events_and_recorder() {
        let events = Arc::new(CollectingEventSink::new());
        let recorder = Arc::new(MemoryRunRecorder::new());
        let agent = CarmenAgent::builder(offline_config())
            .event_sink(events.clone())
            .recorder(recorder.clone())
            .build()
            .await
            .unwrap();

        let run = agent.process("Hello there", JsonObject::new(), ProcessOptions::new()).await;
        assert!(run.success);

        assert_eq!(events.events_of_type("pipeline.completed").len(), 1);
        assert_eq!(events.events_of_type("breaker.success").len(), 3);

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while recorder.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(recorder.records()[0].run_id(), run.run_id);
    }

    #[tokio::test]
    async fn test_run_log_opened_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let agent = CarmenAgent::new(offline_config().with_run_log(&path)).await.unwrap();

        agent.process("Hello there", JsonObject::new(), ProcessOptions::new()).await;

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while !path.exists() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
