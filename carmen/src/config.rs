//! Top-level configuration.
//!
//! Every section has defaults, so `{}` is a valid configuration: grok as the
//! default provider with keys from the environment, AGAPE, ERIS and METIS
//! enabled and required, THALIA_ROSE and THOTH disabled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::breaker::BreakerConfig;
use crate::core::StageId;
use crate::errors::CarmenError;
use crate::llm::{LlmConfig, RetryConfig};
use crate::observability::LogFormat;
use crate::pipeline::{EarlyExitPolicy, ProcessingConfig};
use crate::stages::{StageDescriptor, StageSettings};
use crate::synthesis::SynthesisConfig;

/// Configuration of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Whether the stage is scheduled.
    pub enabled: bool,
    /// Required stages are never skipped by early exit.
    pub required: bool,
    /// Priority override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Dependency override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<StageId>>,
    /// Provider override; the LLM default provider when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model override for this stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Temperature, token limit and stage options.
    #[serde(flatten)]
    pub settings: StageSettings,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            priority: None,
            dependencies: None,
            provider: None,
            model: None,
            settings: StageSettings::default(),
        }
    }
}

impl StageConfig {
    /// The configuration used for a stage absent from the config file.
    #[must_use]
    pub fn default_for(stage: StageId) -> Self {
        match stage {
            StageId::Agape | StageId::Eris | StageId::Metis => Self::default(),
            StageId::ThaliaRose | StageId::Thoth => Self {
                enabled: false,
                required: false,
                ..Self::default()
            },
        }
    }

    /// Enables or disables the stage.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Marks the stage required or optional.
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: StageSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the stage descriptor.
    #[must_use]
    pub fn descriptor(&self, stage: StageId) -> StageDescriptor {
        let mut descriptor = StageDescriptor::new(stage)
            .with_enabled(self.enabled)
            .with_required(self.required);
        if let Some(priority) = self.priority {
            descriptor = descriptor.with_priority(priority);
        }
        if let Some(dependencies) = &self.dependencies {
            descriptor = descriptor.with_dependencies(dependencies.clone());
        }
        descriptor
    }
}

/// Logging and run history settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Subscriber output format.
    pub format: LogFormat,
    /// JSON lines file receiving one record per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_log: Option<PathBuf>,
}

/// The full agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarmenConfig {
    /// Providers and credentials.
    pub llm: LlmConfig,
    /// Circuit breaker settings, shared by every provider.
    pub breaker: BreakerConfig,
    /// Transport retry settings.
    pub retry: RetryConfig,
    /// Per-stage overrides.
    pub stages: BTreeMap<StageId, StageConfig>,
    /// Response synthesis.
    pub output: SynthesisConfig,
    /// Early-exit policy.
    pub early_exit: EarlyExitPolicy,
    /// Run-wide processing settings.
    pub processing: ProcessingConfig,
    /// Logging and run history.
    pub logging: LoggingConfig,
}

impl CarmenConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, CarmenError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CarmenError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Sets the LLM section.
    #[must_use]
    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    /// Sets the breaker section.
    #[must_use]
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the retry section.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides one stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageId, config: StageConfig) -> Self {
        self.stages.insert(stage, config);
        self
    }

    /// Sets the synthesis section.
    #[must_use]
    pub fn with_output(mut self, output: SynthesisConfig) -> Self {
        self.output = output;
        self
    }

    /// Sets the early-exit policy.
    #[must_use]
    pub fn with_early_exit(mut self, early_exit: EarlyExitPolicy) -> Self {
        self.early_exit = early_exit;
        self
    }

    /// Sets the processing section.
    #[must_use]
    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    /// Sets the run log file.
    #[must_use]
    pub fn with_run_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.logging.run_log = Some(path.into());
        self
    }

    /// The effective configuration of `stage`.
    #[must_use]
    pub fn stage(&self, stage: StageId) -> StageConfig {
        self.stages
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| StageConfig::default_for(stage))
    }

    /// Checks values serde cannot check.
    ///
    /// Stage options are validated when the stages are built.
    pub fn validate(&self) -> Result<(), CarmenError> {
        if self.breaker.failure_threshold == 0 {
            return Err(CarmenError::Config("breaker.failure_threshold must be >= 1".to_string()));
        }
        if self.breaker.success_threshold == 0 {
            return Err(CarmenError::Config("breaker.success_threshold must be >= 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(CarmenError::Config("retry.max_attempts must be >= 1".to_string()));
        }
        if self.output.max_length == 0 {
            return Err(CarmenError::Config("output.max_length must be >= 1".to_string()));
        }
        for (stage, config) in &self.stages {
            if let Some(temperature) = config.settings.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(CarmenError::Config(format!(
                        "stages.{stage}.temperature must be 0-2"
                    )));
                }
            }
        }
        Ok(())
    }
}
