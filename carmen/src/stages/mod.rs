//! Stage trait and the CARMEN analysis stages.
//!
//! Every stage produces *a* result: a live call that fails, is rejected by
//! the breaker, or returns malformed output is replaced by fallback output.
//! Only internal errors escape as [`StageError`].

mod agape;
mod analysis;
mod descriptor;
mod eris;
mod error;
mod metis;
mod parse;
mod schema;
#[cfg(test)]
mod stage_tests;
mod strategy;
mod thalia_rose;
mod thoth;

pub use analysis::AnalysisStage;
pub use descriptor::{StageDescriptor, StageSettings};
pub use error::StageError;
pub use parse::extract_json_object;
pub use schema::{default_temperature, effective_options, system_prompt, validate_output};
pub use strategy::{FallbackStrategy, LiveStrategy, StageStrategy, StrategyOutput, StrategyRequest};

use async_trait::async_trait;
use std::fmt::Debug;

use crate::context::StageContext;
use crate::core::{StageId, StageResult};

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stage descriptor.
    fn descriptor(&self) -> &StageDescriptor;

    /// Returns the stage identifier.
    fn id(&self) -> StageId {
        self.descriptor().id
    }

    /// Runs the stage once.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only for internal errors that could not be
    /// turned into a fallback result.
    async fn run(&self, input: &str, ctx: &StageContext) -> Result<StageResult, StageError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&str, &StageContext) -> Result<StageResult, StageError> + Send + Sync,
{
    descriptor: StageDescriptor,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&str, &StageContext) -> Result<StageResult, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(descriptor: StageDescriptor, func: F) -> Self {
        Self { descriptor, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&str, &StageContext) -> Result<StageResult, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("id", &self.descriptor.id)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&str, &StageContext) -> Result<StageResult, StageError> + Send + Sync,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    async fn run(&self, input: &str, ctx: &StageContext) -> Result<StageResult, StageError> {
        (self.func)(input, ctx)
    }
}
