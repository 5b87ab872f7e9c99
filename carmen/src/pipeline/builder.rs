//! Pipeline builder with validation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{EarlyExitPolicy, Pipeline, ProcessingConfig};
use crate::core::StageId;
use crate::errors::{CarmenError, ContractSuggestions, CycleDetectedError, PipelineValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::persistence::{NoOpRunRecorder, RunRecorder};
use crate::stages::Stage;
use crate::synthesis::ResponseSynthesizer;

/// Builder for creating validated pipelines.
///
/// Duplicate and self-dependent stages are rejected as they are added.
/// Missing dependencies and cycles are checked by [`Self::build`], once the
/// whole stage set is known.
pub struct PipelineBuilder {
    name: String,
    stages: HashMap<StageId, Arc<dyn Stage>>,
    stage_order: Vec<StageId>,
    early_exit: EarlyExitPolicy,
    processing: ProcessingConfig,
    synthesizer: ResponseSynthesizer,
    events: Arc<dyn EventSink>,
    recorder: Arc<dyn RunRecorder>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: HashMap::new(),
            stage_order: Vec::new(),
            early_exit: EarlyExitPolicy::default(),
            processing: ProcessingConfig::default(),
            synthesizer: ResponseSynthesizer::default(),
            events: Arc::new(NoOpEventSink),
            recorder: Arc::new(NoOpRunRecorder),
        }
    }

    /// Adds a stage to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is already registered or depends on
    /// itself.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        self.add_stage(stage)?;
        Ok(self)
    }

    /// Adds a stage in place.
    ///
    /// # Errors
    ///
    /// Same as [`Self::stage`].
    pub fn add_stage(&mut self, stage: Arc<dyn Stage>) -> Result<(), PipelineValidationError> {
        let id = stage.id();
        if self.stages.contains_key(&id) {
            return Err(ContractSuggestions::error(
                ContractSuggestions::CONFLICT,
                format!("Stage '{id}' is registered more than once"),
                vec![id.to_string()],
            ));
        }
        if stage.descriptor().dependencies.contains(&id) {
            return Err(ContractSuggestions::error(
                ContractSuggestions::SELF_DEP,
                format!("Stage '{id}' depends on itself"),
                vec![id.to_string()],
            ));
        }

        self.stage_order.push(id);
        self.stages.insert(id, stage);
        Ok(())
    }

    /// Sets the early-exit policy.
    #[must_use]
    pub fn early_exit(mut self, policy: EarlyExitPolicy) -> Self {
        self.early_exit = policy;
        self
    }

    /// Sets the run-wide processing settings.
    #[must_use]
    pub fn processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    /// Sets the response synthesizer.
    #[must_use]
    pub fn synthesizer(mut self, synthesizer: ResponseSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the run recorder.
    #[must_use]
    pub fn recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency names a stage that is not part of
    /// the pipeline, if the dependencies form a cycle, or if no stage is
    /// enabled.
    pub fn build(self) -> Result<Pipeline, CarmenError> {
        for id in &self.stage_order {
            let Some(stage) = self.stages.get(id) else {
                continue;
            };
            if let Some(missing) = stage
                .descriptor()
                .dependencies
                .iter()
                .find(|dep| !self.stages.contains_key(dep))
            {
                return Err(ContractSuggestions::error(
                    ContractSuggestions::MISSING_DEP,
                    format!("Stage '{id}' depends on unknown stage '{missing}'"),
                    vec![id.to_string(), missing.to_string()],
                )
                .into());
            }
        }

        self.detect_cycles()?;

        let mut schedule: Vec<Arc<dyn Stage>> = self
            .stage_order
            .iter()
            .filter_map(|id| self.stages.get(id))
            .filter(|stage| stage.descriptor().enabled)
            .cloned()
            .collect();
        if schedule.is_empty() {
            return Err(ContractSuggestions::error(
                ContractSuggestions::EMPTY,
                format!("Pipeline '{}' has no enabled stages", self.name),
                Vec::new(),
            )
            .into());
        }
        // Stable: equal priorities keep declaration order.
        schedule.sort_by_key(|stage| stage.descriptor().priority);

        let registered = self
            .stage_order
            .iter()
            .filter_map(|id| self.stages.get(id))
            .cloned()
            .collect();

        Ok(Pipeline {
            name: self.name,
            registered,
            schedule,
            early_exit: self.early_exit,
            processing: self.processing,
            synthesizer: self.synthesizer,
            events: self.events,
            recorder: self.recorder,
            fallback: crate::fallback::FallbackProvider::new(),
        })
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for &id in &self.stage_order {
            if !visited.contains(&id) {
                if let Some(cycle) = self.dfs_cycle(id, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(
                        cycle.iter().map(ToString::to_string).collect(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: StageId,
        visited: &mut HashSet<StageId>,
        rec_stack: &mut HashSet<StageId>,
        path: &mut Vec<StageId>,
    ) -> Option<Vec<StageId>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(stage) = self.stages.get(&node) {
            for &dep in &stage.descriptor().dependencies {
                if !visited.contains(&dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(&dep) {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(&node);
        None
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stage_order)
            .field("early_exit", &self.early_exit)
            .field("processing", &self.processing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{AnalysisStage, StageDescriptor};

    fn stage(descriptor: StageDescriptor) -> Arc<dyn Stage> {
        Arc::new(AnalysisStage::new(descriptor).unwrap())
    }

    fn default_stage(id: StageId) -> Arc<dyn Stage> {
        stage(StageDescriptor::new(id))
    }

    fn code(err: &CarmenError) -> Option<&str> {
        match err {
            CarmenError::Validation(e) => e.code(),
            CarmenError::CycleDetected(e) => Some(e.error_info.code.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("carmen");
        assert_eq!(builder.name(), "carmen");
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_builder_with_dependencies() {
        let pipeline = PipelineBuilder::new("carmen")
            .stage(default_stage(StageId::Agape))
            .unwrap()
            .stage(default_stage(StageId::Eris))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_ids(), vec![StageId::Agape, StageId::Eris]);
    }

    #[test]
    fn test_builder_duplicate_stage() {
        let err = PipelineBuilder::new("carmen")
            .stage(default_stage(StageId::Agape))
            .unwrap()
            .stage(default_stage(StageId::Agape))
            .unwrap_err();

        assert_eq!(err.code(), Some(ContractSuggestions::CONFLICT));
    }

    #[test]
    fn test_builder_self_dependency() {
        let err = PipelineBuilder::new("carmen")
            .stage(stage(StageDescriptor::new(StageId::Thoth).with_dependencies(vec![StageId::Thoth])))
            .unwrap_err();

        assert_eq!(err.code(), Some(ContractSuggestions::SELF_DEP));
    }

    #[test]
    fn test_builder_missing_dependency() {
        let err = PipelineBuilder::new("carmen")
            .stage(default_stage(StageId::Eris))
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(code(&err), Some(ContractSuggestions::MISSING_DEP));
        assert_eq!(err.to_string(), "Stage 'ERIS' depends on unknown stage 'AGAPE'");
    }

    #[test]
    fn test_builder_cycle_detection() {
        let err = PipelineBuilder::new("carmen")
            .stage(stage(StageDescriptor::new(StageId::Agape).with_dependencies(vec![StageId::Metis])))
            .unwrap()
            .stage(default_stage(StageId::Eris))
            .unwrap()
            .stage(default_stage(StageId::Metis))
            .unwrap()
            .build()
            .unwrap_err();

        assert_eq!(code(&err), Some(ContractSuggestions::CYCLE));
        let CarmenError::CycleDetected(cycle) = err else {
            panic!("expected cycle error");
        };
        assert_eq!(cycle.cycle_path.first(), cycle.cycle_path.last());
        assert_eq!(cycle.cycle_path.len(), 4);
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("carmen").build().unwrap_err();
        assert_eq!(code(&err), Some(ContractSuggestions::EMPTY));

        let err = PipelineBuilder::new("carmen")
            .stage(stage(StageDescriptor::new(StageId::Thoth).with_enabled(false)))
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(code(&err), Some(ContractSuggestions::EMPTY));
    }

    #[test]
    fn test_schedule_sorted_by_priority_then_declaration() {
        let pipeline = PipelineBuilder::new("carmen")
            .stage(stage(StageDescriptor::new(StageId::Thoth).with_priority(1)))
            .unwrap()
            .stage(default_stage(StageId::Agape))
            .unwrap()
            .stage(stage(StageDescriptor::new(StageId::Eris).with_priority(0)))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            pipeline.schedule_ids(),
            vec![StageId::Eris, StageId::Thoth, StageId::Agape]
        );
    }

    #[test]
    fn test_disabled_stage_still_satisfies_dependency_check() {
        let pipeline = PipelineBuilder::new("carmen")
            .stage(stage(StageDescriptor::new(StageId::Agape).with_enabled(false)))
            .unwrap()
            .stage(default_stage(StageId::Eris))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.schedule_ids(), vec![StageId::Eris]);
        assert_eq!(pipeline.stage_ids().len(), 2);
    }
}
