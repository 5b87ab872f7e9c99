//! Pipeline building and execution.
//!
//! This module provides:
//! - The pipeline builder with dependency validation
//! - The sequential executor and its run record
//! - The early-exit policy for optional stages

mod builder;
mod early_exit;
mod executor;
#[cfg(test)]
mod integration_tests;
mod options;
mod run;

pub use builder::PipelineBuilder;
pub use early_exit::EarlyExitPolicy;
pub use executor::Pipeline;
pub use options::{ProcessOptions, ProcessingConfig};
pub use run::{success_flags, total_tokens, ErrorLogEntry, RunResult};
