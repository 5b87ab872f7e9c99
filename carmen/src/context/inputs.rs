//! The outputs a stage can see when it runs.

use super::{DegradedOutput, DegradedReason, ResolvedDependency};
use crate::core::{JsonObject, StageId, StageOutcome, StageOutputs, StageResult};
use crate::fallback::FallbackProvider;

/// Prior outputs plus the resolution of each declared dependency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageInputs {
    prior: StageOutputs,
    dependencies: Vec<(StageId, ResolvedDependency)>,
}

impl StageInputs {
    /// Creates inputs from already-resolved parts.
    #[must_use]
    pub fn new(prior: StageOutputs, dependencies: Vec<(StageId, ResolvedDependency)>) -> Self {
        Self { prior, dependencies }
    }

    /// Resolves `dependencies` against the results recorded so far.
    ///
    /// Every stage with a usable output (live or fallback) is visible. Each
    /// declared dependency without one gets a [`DegradedOutput`] built by
    /// `fallback` from the raw input and the outputs visible at that point.
    #[must_use]
    pub fn resolve(
        dependencies: &[StageId],
        results: &[StageResult],
        scheduled: &[StageId],
        input: &str,
        fallback: &FallbackProvider,
    ) -> Self {
        let prior: StageOutputs = results
            .iter()
            .filter_map(|result| result.usable_output().map(|output| (result.stage, output.clone())))
            .collect();

        let mut visible = prior.clone();
        let mut resolved = Vec::with_capacity(dependencies.len());
        for &dep in dependencies {
            if let Some(output) = prior.get(&dep) {
                resolved.push((dep, Ok(output.clone())));
                continue;
            }

            let reason = match results.iter().find(|result| result.stage == dep) {
                Some(result) if result.outcome == StageOutcome::Skipped => DegradedReason::Skipped,
                Some(_) => DegradedReason::Failed,
                None if scheduled.contains(&dep) => DegradedReason::NotYetRun,
                None => DegradedReason::NotScheduled,
            };
            let payload = fallback.fallback_for(dep, input, &visible);
            visible.insert(dep, payload.clone());
            resolved.push((
                dep,
                Err(DegradedOutput {
                    stage: dep,
                    reason,
                    payload,
                }),
            ));
        }

        Self {
            prior,
            dependencies: resolved,
        }
    }

    /// Usable outputs of stages that already ran.
    #[must_use]
    pub fn prior(&self) -> &StageOutputs {
        &self.prior
    }

    /// Output of a stage that already ran.
    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<&JsonObject> {
        self.prior.get(&stage)
    }

    /// Resolution of a declared dependency.
    #[must_use]
    pub fn dependency(&self, stage: StageId) -> Option<&ResolvedDependency> {
        self.dependencies
            .iter()
            .find(|(id, _)| *id == stage)
            .map(|(_, resolved)| resolved)
    }

    /// All declared dependencies in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[(StageId, ResolvedDependency)] {
        &self.dependencies
    }

    /// Degraded dependencies only.
    pub fn degraded(&self) -> impl Iterator<Item = &DegradedOutput> {
        self.dependencies.iter().filter_map(|(_, resolved)| resolved.as_ref().err())
    }

    /// Whether any declared dependency is degraded.
    #[must_use]
    pub fn has_degraded(&self) -> bool {
        self.degraded().next().is_some()
    }

    /// Prior outputs merged with degraded payloads; real outputs win.
    #[must_use]
    pub fn visible_outputs(&self) -> StageOutputs {
        let mut visible = self.prior.clone();
        for degraded in self.degraded() {
            visible
                .entry(degraded.stage)
                .or_insert_with(|| degraded.payload.clone());
        }
        visible
    }
}
