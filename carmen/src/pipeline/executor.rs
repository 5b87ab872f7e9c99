//! Sequential pipeline execution.

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::run::{executed_stages, success_flags, total_tokens, ErrorLogEntry, RunResult};
use super::{EarlyExitPolicy, ProcessOptions, ProcessingConfig};
use crate::context::{ExecutionMode, StageContext, StageInputs};
use crate::core::{JsonObject, StageId, StageOutcome, StageResult};
use crate::errors::CarmenError;
use crate::events::EventSink;
use crate::fallback::FallbackProvider;
use crate::persistence::{RunRecord, RunRecorder};
use crate::stages::Stage;
use crate::synthesis::ResponseSynthesizer;

/// A validated pipeline, built by [`super::PipelineBuilder`].
///
/// Stages run one after another in priority order. A stage that fails,
/// returns an error or panics is replaced by fallback output, so a run only
/// reports failure for problems outside any stage.
pub struct Pipeline {
    pub(super) name: String,
    pub(super) registered: Vec<Arc<dyn Stage>>,
    pub(super) schedule: Vec<Arc<dyn Stage>>,
    pub(super) early_exit: EarlyExitPolicy,
    pub(super) processing: ProcessingConfig,
    pub(super) synthesizer: ResponseSynthesizer,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) recorder: Arc<dyn RunRecorder>,
    pub(super) fallback: FallbackProvider,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every registered stage, enabled or not, in declaration order.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.registered.iter().map(|stage| stage.id()).collect()
    }

    /// Enabled stages in execution order.
    #[must_use]
    pub fn schedule_ids(&self) -> Vec<StageId> {
        self.schedule.iter().map(|stage| stage.id()).collect()
    }

    /// Returns the processing settings.
    #[must_use]
    pub fn processing(&self) -> &ProcessingConfig {
        &self.processing
    }

    /// Runs every enabled stage over `input` and synthesizes the response.
    ///
    /// `context` is the caller's base context, visible to every stage.
    pub async fn process(&self, input: &str, context: JsonObject, options: ProcessOptions) -> RunResult {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = options.run_id.unwrap_or_else(Uuid::new_v4);
        let cancel = options.cancel.unwrap_or_default();

        if input.trim().is_empty() {
            let err = CarmenError::EmptyInput;
            warn!(run_id = %run_id, pipeline = %self.name, "Rejecting run: {}", err);
            return RunResult::failed(run_id, err.to_string(), elapsed_ms(started), started_at);
        }

        info!(
            run_id = %run_id,
            pipeline = %self.name,
            stages = self.schedule.len(),
            "Pipeline started"
        );
        self.events.try_emit(
            "pipeline.started",
            Some(json!({
                "run_id": run_id,
                "pipeline": &self.name,
                "stages": self.schedule_ids(),
            })),
        );

        let scheduled = self.schedule_ids();
        let budget = self.processing.budget();
        let mut results: Vec<StageResult> = Vec::with_capacity(self.schedule.len());
        let mut stage_timings = BTreeMap::new();
        let mut error_log = Vec::new();
        let mut cancelled = false;

        for stage in &self.schedule {
            let id = stage.id();
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if let Some(reason) = self.early_exit.skip_reason(stage.descriptor(), input, &results) {
                info!(run_id = %run_id, stage = %id, reason = %reason, "Skipping stage");
                self.events
                    .try_emit("stage.skipped", Some(json!({"stage": id, "reason": &reason})));
                stage_timings.insert(id, 0);
                results.push(StageResult::skipped(id, reason));
                continue;
            }

            let inputs = StageInputs::resolve(
                &stage.descriptor().dependencies,
                &results,
                &scheduled,
                input,
                &self.fallback,
            );
            let mode = if started.elapsed() >= budget {
                ExecutionMode::FallbackOnly
            } else {
                ExecutionMode::Live
            };
            let ctx = StageContext::new(run_id, context.clone(), inputs)
                .with_cancel(cancel.clone())
                .with_mode(mode)
                .with_fallback_enabled(self.processing.enable_fallback);

            self.events.try_emit("stage.started", Some(json!({"stage": id})));
            let stage_started = Instant::now();

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                outcome = AssertUnwindSafe(stage.run(input, &ctx)).catch_unwind() => Some(outcome),
            };
            let stage_ms = elapsed_ms(stage_started);

            let Some(outcome) = outcome else {
                warn!(run_id = %run_id, stage = %id, "Run cancelled while stage was in flight");
                cancelled = true;
                break;
            };

            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!(run_id = %run_id, stage = %id, error = %e, "Stage returned an error");
                    self.recover(id, input, &ctx, e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(run_id = %run_id, stage = %id, panic = %message, "Stage panicked");
                    self.recover(id, input, &ctx, format!("stage panicked: {message}"))
                }
            }
            .with_elapsed_ms(stage_ms);

            stage_timings.insert(id, stage_ms);
            if let Some(err) = &result.error {
                error_log.push(ErrorLogEntry {
                    stage: id,
                    error: err.clone(),
                });
            }
            let event = match result.outcome {
                StageOutcome::Fallback => "stage.fallback",
                StageOutcome::Failure => "stage.failed",
                StageOutcome::Success | StageOutcome::Skipped => "stage.completed",
            };
            self.events.try_emit(
                event,
                Some(json!({
                    "stage": id,
                    "outcome": result.outcome,
                    "duration_ms": stage_ms,
                    "tokens_used": result.tokens_used,
                    "error": &result.error,
                })),
            );
            results.push(result);
        }

        let response = self.synthesizer.synthesize(&results);
        let run = RunResult {
            run_id,
            success: true,
            response,
            elapsed_ms: elapsed_ms(started),
            total_tokens: total_tokens(&results),
            executed_stages: executed_stages(&results),
            success_flags: success_flags(&results),
            stage_results: results,
            stage_timings,
            error_log,
            cancelled,
            error: None,
            started_at,
        };

        if cancelled {
            warn!(
                run_id = %run_id,
                completed = run.stage_results.len(),
                reason = ?cancel.reason(),
                "Pipeline cancelled"
            );
            self.events.try_emit(
                "pipeline.cancelled",
                Some(json!({"run_id": run_id, "reason": cancel.reason()})),
            );
        } else {
            info!(
                run_id = %run_id,
                elapsed_ms = run.elapsed_ms,
                total_tokens = run.total_tokens,
                flags = %run.success_flags,
                "Pipeline completed"
            );
            self.events.try_emit(
                "pipeline.completed",
                Some(json!({
                    "run_id": run_id,
                    "elapsed_ms": run.elapsed_ms,
                    "total_tokens": run.total_tokens,
                    "success_flags": &run.success_flags,
                })),
            );
        }

        self.record(&run, input, context);
        run
    }

    fn recover(&self, stage: StageId, input: &str, ctx: &StageContext, reason: String) -> StageResult {
        if !self.processing.enable_fallback {
            return StageResult::failure(stage, reason);
        }
        let output = self.fallback.fallback_for(stage, input, &ctx.visible_outputs());
        StageResult::fallback(stage, output, reason)
            .with_metadata("strategy", "fallback")
            .with_metadata("recovered", true)
    }

    fn record(&self, run: &RunResult, input: &str, context: JsonObject) {
        let record = RunRecord::new(run.clone(), input, context);
        let recorder = Arc::clone(&self.recorder);
        let run_id = run.run_id;
        tokio::spawn(async move {
            if let Err(e) = recorder.append(record).await {
                warn!(run_id = %run_id, error = %e, "Failed to record run");
            }
        });
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("schedule", &self.schedule_ids())
            .field("early_exit", &self.early_exit)
            .field("processing", &self.processing)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

