//! Per-run options and run-wide processing settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::cancellation::CancellationToken;

/// Options for a single call to [`super::Pipeline::process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Run ID to use instead of a generated one.
    pub run_id: Option<Uuid>,
    /// Token the caller can use to cancel the run.
    pub cancel: Option<CancellationToken>,
}

impl ProcessOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run ID.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Settings that apply to every run of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Budget for one run. Stages that start after it is spent run in
    /// fallback-only mode.
    pub max_processing_time_ms: u64,
    /// Substitute fallback output for failed stages. When off, a failed
    /// stage records a `Failure` result with no output.
    pub enable_fallback: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processing_time_ms: 30_000,
            enable_fallback: true,
        }
    }
}

impl ProcessingConfig {
    /// Creates the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the processing time budget.
    #[must_use]
    pub fn with_max_processing_time_ms(mut self, ms: u64) -> Self {
        self.max_processing_time_ms = ms;
        self
    }

    /// Enables or disables fallback substitution.
    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enable_fallback = enabled;
        self
    }

    /// Returns the processing time budget.
    #[must_use]
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.max_processing_time_ms)
    }
}
