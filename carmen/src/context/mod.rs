//! Context handed to each stage.
//!
//! This module provides:
//! - The soft dependency sum type, [`ResolvedDependency`]
//! - [`StageInputs`], which resolves dependencies against earlier results
//! - [`StageContext`], the full per-stage view including cancellation

mod dependency;
mod execution;
mod inputs;

pub use dependency::{DegradedOutput, DegradedReason, ResolvedDependency};
pub use execution::{ExecutionMode, StageContext};
pub use inputs::StageInputs;
