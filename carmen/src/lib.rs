//! # Carmen
//!
//! A five-stage text analysis agent that keeps answering when its language
//! model provider does not.
//!
//! Carmen runs an input through up to five analysis stages:
//!
//! - **AGAPE**: core needs, emotional tone and a love score
//! - **ERIS**: discord, root causes and severity
//! - **METIS**: the gap between the ideal and current state
//! - **THALIA_ROSE**: whether humor fits
//! - **THOTH**: claim verification
//!
//! Each stage calls a provider through a per-provider circuit breaker. When
//! the call fails, the breaker is open or the output does not validate, the
//! stage produces a deterministic fallback payload instead, tagged so the
//! final response can say which parts were estimated.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use carmen::prelude::*;
//!
//! let config = CarmenConfig::from_json_file("carmen.json")?;
//! let agent = CarmenAgent::new(config).await?;
//!
//! let run = agent
//!     .process("I'm frustrated with this.", JsonObject::new(), ProcessOptions::new())
//!     .await;
//! println!("{} [{}]", run.response, run.success_flags);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agent;
pub mod breaker;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod fallback;
pub mod llm;
pub mod observability;
pub mod persistence;
pub mod pipeline;
pub mod stages;
pub mod synthesis;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agent::{AgentBuilder, CarmenAgent};
    pub use crate::breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{CarmenConfig, StageConfig};
    pub use crate::context::{ExecutionMode, StageContext, StageInputs};
    pub use crate::core::{JsonObject, StageId, StageOutcome, StageResult};
    pub use crate::errors::{CarmenError, PipelineValidationError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::fallback::FallbackProvider;
    pub use crate::llm::{ClientFactory, LlmClient, LlmConfig, ProviderError};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::persistence::{JsonlRunRecorder, RunRecorder};
    pub use crate::pipeline::{EarlyExitPolicy, Pipeline, PipelineBuilder, ProcessOptions, RunResult};
    pub use crate::stages::{AnalysisStage, Stage, StageDescriptor, StageSettings};
    pub use crate::synthesis::{ResponseSynthesizer, SynthesisConfig};
}
