//! Error types for the carmen pipeline.
//!
//! Each layer owns its error enum: transport failures live in
//! [`crate::llm::ProviderError`], breaker rejections in
//! [`crate::breaker::BreakerError`], stage failures in
//! [`crate::stages::StageError`]. This module holds the crate-level error
//! and the structured validation errors raised while building a pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::llm::ProviderError;

/// The main error type for carmen operations.
///
/// Only run-level problems surface as `CarmenError`; anything that goes wrong
/// inside a stage is resolved by the fallback path instead.
#[derive(Debug, Error)]
pub enum CarmenError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected between stage dependencies.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// The input text was empty or whitespace only.
    #[error("Input text must not be empty")]
    EmptyInput,

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider client could not be created.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Tracing could not be initialised.
    #[error("Observability error: {0}")]
    Observability(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a dependency cycle is found.
#[derive(Debug, Clone, Error)]
#[error("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The stages forming the cycle, first stage repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle error from the detected path.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let error_info = ContractErrorInfo::new(
            ContractSuggestions::CYCLE,
            "Stage dependencies form a cycle",
        )
        .with_fix_hint("Remove one of the dependencies so the stages can be ordered")
        .with_context_entry("cycle", cycle_path.join(" -> "));
        Self {
            cycle_path,
            error_info,
        }
    }
}

/// Contract error codes and the fix hints attached to them.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// A dependency cycle.
    pub const CYCLE: &'static str = "CONTRACT-004-CYCLE";
    /// A dependency on a stage that is not part of the pipeline.
    pub const MISSING_DEP: &'static str = "CONTRACT-004-MISSING_DEP";
    /// A stage that depends on itself.
    pub const SELF_DEP: &'static str = "CONTRACT-004-SELF_DEP";
    /// The same stage registered twice.
    pub const CONFLICT: &'static str = "CONTRACT-004-CONFLICT";
    /// A pipeline with no stages.
    pub const EMPTY: &'static str = "CONTRACT-004-EMPTY";
    /// Invalid per-stage settings.
    pub const SETTINGS: &'static str = "CONTRACT-005-SETTINGS";

    /// Returns the fix hint for a known code.
    #[must_use]
    pub fn hint(code: &str) -> Option<&'static str> {
        match code {
            Self::CYCLE => Some("Remove one of the dependencies so the stages can be ordered"),
            Self::MISSING_DEP => Some("Add the missing stage to the pipeline or drop the dependency"),
            Self::SELF_DEP => Some("A stage cannot depend on its own output"),
            Self::CONFLICT => Some("Register each stage once"),
            Self::EMPTY => Some("Enable at least one stage"),
            Self::SETTINGS => Some("Check the stage options against their allowed ranges"),
            _ => None,
        }
    }

    /// Builds a validation error with the standard hint for `code`.
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>, stages: Vec<String>) -> PipelineValidationError {
        let message = message.into();
        let mut info = ContractErrorInfo::new(code, message.clone());
        if let Some(hint) = Self::hint(code) {
            info = info.with_fix_hint(hint);
        }
        PipelineValidationError::new(message)
            .with_stages(stages)
            .with_error_info(info)
    }
}

/// Result alias for carmen operations.
pub type Result<T, E = CarmenError> = std::result::Result<T, E>;
