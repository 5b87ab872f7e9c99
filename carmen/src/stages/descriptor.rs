//! Stage descriptors and per-stage settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{JsonObject, StageId};

/// Static facts about a stage: when it runs and what it needs.
///
/// Immutable once the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// The stage.
    pub id: StageId,
    /// Execution priority; lower runs first.
    pub priority: i32,
    /// Soft dependencies in declaration order.
    pub dependencies: Vec<StageId>,
    /// Required stages are never skipped by early exit.
    pub required: bool,
    /// Disabled stages are not scheduled.
    pub enabled: bool,
}

impl StageDescriptor {
    /// Creates a descriptor with the stage's default priority and dependencies.
    #[must_use]
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            priority: id.default_priority(),
            dependencies: id.default_dependencies().to_vec(),
            required: true,
            enabled: true,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Replaces the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl Into<Vec<StageId>>) -> Self {
        self.dependencies = dependencies.into();
        self
    }

    /// Marks the stage required or optional.
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Enables or disables the stage.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Tunables for one stage's live calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Sampling temperature; the stage default when unset.
    pub temperature: Option<f32>,
    /// Completion token limit; the provider default when unset.
    pub max_tokens: Option<u32>,
    /// Stage-specific option overrides, merged over the stage defaults.
    pub options: JsonObject,
    /// Whether malformed live output counts as a breaker failure.
    pub malformed_counts_as_failure: bool,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: None,
            options: JsonObject::new(),
            malformed_counts_as_failure: true,
        }
    }
}

impl StageSettings {
    /// Creates default settings.
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

    /// Sets one option override.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets whether malformed output counts as a breaker failure.
    #[must_use]
    pub fn with_malformed_counts_as_failure(mut self, counts: bool) -> Self {
        self.malformed_counts_as_failure = counts;
        self
    }
}
