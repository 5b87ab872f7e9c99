//! End-to-end runs through the pipeline.

#[cfg(test)]
mod tests {
    use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState, ManualClock};
    use crate::cancellation::CancellationToken;
    use crate::context::StageContext;
    use crate::core::{JsonObject, StageId, StageOutcome, StageResult};
    use crate::events::CollectingEventSink;
    use crate::llm::{LlmClient, LlmResponse, ProviderError, ScriptedLlmClient};
    use crate::persistence::MemoryRunRecorder;
    use crate::pipeline::{EarlyExitPolicy, PipelineBuilder, ProcessOptions, ProcessingConfig};
    use crate::stages::{AnalysisStage, FnStage, LiveStrategy, Stage, StageDescriptor, StageError};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    const FRUSTRATED: &str = "I'm frustrated with this.";

    const AGAPE_JSON: &str = r#"{"loving_actions": ["Provide a working solution now"],
        "behavioral_scores": {"did_it_help": true}, "love_score": 0.9,
        "why_loving": "Helps right away"}"#;

    const ERIS_JSON: &str = r#"{"discord_detected": true, "root_cause": "Missing constraints",
        "root_cause_type": "constraint", "severity": "medium", "contributing_factors": ["budget"],
        "pattern_identified": "none", "prevention_strategy": "Ask first"}"#;

    fn offline(id: StageId) -> Arc<dyn Stage> {
        Arc::new(AnalysisStage::new(StageDescriptor::new(id)).unwrap())
    }

    fn live(id: StageId, client: Arc<dyn LlmClient>) -> Arc<dyn Stage> {
        Arc::new(
            AnalysisStage::new(StageDescriptor::new(id))
                .unwrap()
                .with_live(LiveStrategy::new(client)),
        )
    }

    fn core_builder() -> PipelineBuilder {
        PipelineBuilder::new("test")
            .stage(offline(StageId::Agape))
            .unwrap()
            .stage(offline(StageId::Eris))
            .unwrap()
            .stage(offline(StageId::Metis))
            .unwrap()
    }

    fn scripted(text: &str, prompt: u64, completion: u64) -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::new(vec![Ok(
            LlmResponse::new(text, "scripted", "scripted-model").with_usage(prompt, completion)
        )]))
    }

    async fn run(pipeline: &crate::pipeline::Pipeline, input: &str) -> crate::pipeline::RunResult {
        pipeline.process(input, JsonObject::new(), ProcessOptions::new()).await
    }

    #[tokio::test]
    async fn test_offline_run_falls_back_everywhere() {
        let pipeline = core_builder().build().unwrap();
        let result = run(&pipeline, FRUSTRATED).await;

        assert!(result.success);
        assert!(!result.cancelled);
        assert_eq!(result.success_flags, "FFF00");
        assert_eq!(result.executed_stages, vec![StageId::Agape, StageId::Eris, StageId::Metis]);
        assert_eq!(result.fallback_stages(), vec![StageId::Agape, StageId::Eris, StageId::Metis]);
        assert_eq!(result.total_tokens, 0);
        assert_eq!(result.stage_timings.len(), 3);
        assert_eq!(result.error_log.len(), 3);

        let eris = result.result(StageId::Eris).unwrap();
        assert_eq!(eris.field("discord_detected"), Some(&json!(true)));
        assert!(eris.metadata["context_stages"]
            .as_array()
            .unwrap()
            .contains(&json!("AGAPE")));

        assert!(!result.response.is_empty());
        assert!(result.response.contains("Parts of this response are estimated"));
    }

    #[tokio::test]
    async fn test_required_stage_runs_on_degraded_dependency() {
        let pipeline = PipelineBuilder::new("test")
            .stage(offline(StageId::Agape))
            .unwrap()
            .stage(Arc::new(
                AnalysisStage::new(StageDescriptor::new(StageId::Eris).with_enabled(false)).unwrap(),
            ))
            .unwrap()
            .stage(offline(StageId::Metis))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.schedule_ids(), vec![StageId::Agape, StageId::Metis]);

        let result = run(&pipeline, FRUSTRATED).await;
        assert!(result.success);
        assert_eq!(result.success_flags, "F0F00");

        let metis = result.result(StageId::Metis).unwrap();
        assert_eq!(metis.outcome, StageOutcome::Fallback);
        assert!(metis.used_fallback());
        assert_eq!(metis.metadata["degraded_dependencies"], json!(["ERIS"]));
    }

    #[tokio::test]
    async fn test_tokens_sum_over_live_stages() {
        let pipeline = PipelineBuilder::new("test")
            .stage(live(StageId::Agape, scripted(AGAPE_JSON, 100, 50)))
            .unwrap()
            .stage(live(StageId::Eris, scripted(ERIS_JSON, 80, 40)))
            .unwrap()
            .stage(offline(StageId::Metis))
            .unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, FRUSTRATED).await;

        assert_eq!(result.success_flags, "11F00");
        assert_eq!(result.total_tokens, 270);
        assert_eq!(result.result(StageId::Agape).unwrap().tokens_used, 150);
        assert_eq!(result.result(StageId::Metis).unwrap().tokens_used, 0);
        assert_eq!(result.fallback_stages(), vec![StageId::Metis]);
    }

    #[tokio::test]
    async fn test_every_enabled_stage_has_one_result() {
        let pipeline = PipelineBuilder::new("test")
            .stage(offline(StageId::Thoth))
            .unwrap()
            .stage(offline(StageId::Metis))
            .unwrap()
            .stage(offline(StageId::Agape))
            .unwrap()
            .stage(offline(StageId::Eris))
            .unwrap()
            .stage(offline(StageId::ThaliaRose))
            .unwrap()
            .early_exit(EarlyExitPolicy::disabled())
            .build()
            .unwrap();

        let result = run(&pipeline, FRUSTRATED).await;

        let order: Vec<StageId> = result.stage_results.iter().map(|r| r.stage).collect();
        assert_eq!(order, StageId::ALL.to_vec());
        assert_eq!(result.success_flags, "FFFFF");
    }

    #[tokio::test]
    async fn test_stage_error_is_recovered() {
        let failing = FnStage::new(StageDescriptor::new(StageId::Eris), |_: &str, _: &StageContext| {
            Err(StageError::Internal {
                stage: StageId::Eris,
                message: "index out of range".to_string(),
            })
        });
        let pipeline = PipelineBuilder::new("test")
            .stage(offline(StageId::Agape))
            .unwrap()
            .stage(Arc::new(failing))
            .unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, FRUSTRATED).await;

        let eris = result.result(StageId::Eris).unwrap();
        assert_eq!(eris.outcome, StageOutcome::Fallback);
        assert_eq!(eris.metadata["recovered"], json!(true));
        assert!(eris.error.as_deref().unwrap().contains("index out of range"));
        assert_eq!(result.error_log[1].stage, StageId::Eris);
    }

    #[tokio::test]
    async fn test_stage_panic_is_recovered() {
        let panicking = FnStage::new(
            StageDescriptor::new(StageId::Agape),
            |_: &str, _: &StageContext| -> Result<StageResult, StageError> { panic!("boom") },
        );
        let pipeline = PipelineBuilder::new("test")
            .stage(Arc::new(panicking))
            .unwrap()
            .stage(offline(StageId::Eris))
            .unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, FRUSTRATED).await;

        assert!(result.success);
        assert_eq!(result.success_flags, "FF000");
        let agape = result.result(StageId::Agape).unwrap();
        assert_eq!(agape.error.as_deref(), Some("stage panicked: boom"));
        assert!(agape.usable_output().is_some());
    }

    #[tokio::test]
    async fn test_fallback_disabled_records_failures() {
        let pipeline = core_builder()
            .processing(ProcessingConfig::new().with_fallback(false))
            .build()
            .unwrap();

        let result = run(&pipeline, FRUSTRATED).await;

        assert!(result.success);
        assert_eq!(result.success_flags, "00000");
        assert!(result
            .stage_results
            .iter()
            .all(|r| r.outcome == StageOutcome::Failure && r.output.is_none()));
        assert_eq!(result.error_log.len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel("caller went away");
        let pipeline = core_builder().build().unwrap();

        let result = pipeline
            .process(FRUSTRATED, JsonObject::new(), ProcessOptions::new().with_cancel(cancel))
            .await;

        assert!(result.cancelled);
        assert!(result.stage_results.is_empty());
        assert_eq!(result.success_flags, "00000");
    }

    #[tokio::test]
    async fn test_cancelled_while_stage_in_flight() {
        let slow = Arc::new(
            ScriptedLlmClient::new(vec![Ok(LlmResponse::new(AGAPE_JSON, "scripted", "scripted-model"))])
                .with_latency(Duration::from_secs(30)),
        );
        let pipeline = PipelineBuilder::new("test")
            .stage(live(StageId::Agape, slow))
            .unwrap()
            .stage(offline(StageId::Eris))
            .unwrap()
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("shutdown");
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.process(FRUSTRATED, JsonObject::new(), ProcessOptions::new().with_cancel(cancel)),
        )
        .await
        .unwrap();

        assert!(result.cancelled);
        assert!(result.result(StageId::Agape).is_none());
        assert!(result.result(StageId::Eris).is_none());
    }

    #[tokio::test]
    async fn test_optional_stage_skipped_without_discord() {
        let pipeline = PipelineBuilder::new("test")
            .stage(offline(StageId::Agape))
            .unwrap()
            .stage(Arc::new(
                AnalysisStage::new(StageDescriptor::new(StageId::Eris).with_required(false)).unwrap(),
            ))
            .unwrap()
            .stage(offline(StageId::Metis))
            .unwrap()
            .build()
            .unwrap();

        let result = run(&pipeline, "Hello there, lovely day today").await;

        assert_eq!(result.success_flags, "FSF00");
        let eris = result.result(StageId::Eris).unwrap();
        assert_eq!(eris.skip_reason(), Some("no discord indicators in input"));
        assert_eq!(result.stage_timings[&StageId::Eris], 0);
        assert!(!result.executed_stages.contains(&StageId::Eris));

        let metis = result.result(StageId::Metis).unwrap();
        assert_eq!(metis.metadata["degraded_dependencies"], json!(["ERIS"]));

        // Same input with discord keeps the stage.
        let result = run(&pipeline, FRUSTRATED).await;
        assert_eq!(result.success_flags, "FFF00");
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let pipeline = core_builder().build().unwrap();
        let run_id = Uuid::new_v4();

        let result = pipeline
            .process("   ", JsonObject::new(), ProcessOptions::new().with_run_id(run_id))
            .await;

        assert!(!result.success);
        assert_eq!(result.run_id, run_id);
        assert_eq!(result.error.as_deref(), Some("Input text must not be empty"));
        assert!(result.stage_results.is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_run() {
        let events = Arc::new(CollectingEventSink::new());
        let pipeline = core_builder().event_sink(events.clone()).build().unwrap();

        run(&pipeline, FRUSTRATED).await;

        let types = events.event_types();
        assert_eq!(types.first().map(String::as_str), Some("pipeline.started"));
        assert_eq!(types.last().map(String::as_str), Some("pipeline.completed"));
        assert_eq!(events.events_of_type("stage.started").len(), 3);
        assert_eq!(events.events_of_type("stage.fallback").len(), 3);

        let fallback = events.events_of_type("stage.fallback");
        let data = fallback[0].1.as_ref().unwrap();
        assert_eq!(data["stage"], "AGAPE");
        assert_eq!(data["outcome"], "fallback");
    }

    #[tokio::test]
    async fn test_run_is_recorded() {
        let recorder = Arc::new(MemoryRunRecorder::new());
        let pipeline = core_builder().recorder(recorder.clone()).build().unwrap();

        let mut context = JsonObject::new();
        context.insert("user_id".to_string(), json!(42));
        let result = pipeline.process(FRUSTRATED, context, ProcessOptions::new()).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let records = recorder.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run, result);
        assert_eq!(records[0].input, FRUSTRATED);
        assert_eq!(records[0].context["user_id"], 42);
    }

    #[tokio::test]
    async fn test_open_breaker_recovers_after_retry_timeout() {
        let clock = Arc::new(ManualClock::new());
        let breaker = Arc::new(
            CircuitBreaker::new("scripted", BreakerConfig::default()).with_clock(clock.clone()),
        );
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err(ProviderError::Transport("connection refused".to_string())),
            Err(ProviderError::Transport("connection refused".to_string())),
            Err(ProviderError::Transport("connection refused".to_string())),
            Ok(LlmResponse::new(AGAPE_JSON, "scripted", "scripted-model").with_usage(10, 5)),
        ]));
        let stage = AnalysisStage::new(StageDescriptor::new(StageId::Agape))
            .unwrap()
            .with_live(LiveStrategy::new(client.clone()).with_breaker(breaker.clone()));
        let pipeline = PipelineBuilder::new("test")
            .stage(Arc::new(stage))
            .unwrap()
            .build()
            .unwrap();

        for _ in 0..3 {
            let result = run(&pipeline, FRUSTRATED).await;
            assert_eq!(result.success_flags, "F0000");
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(299));
        let result = run(&pipeline, FRUSTRATED).await;
        assert_eq!(result.success_flags, "F0000");
        assert_eq!(client.call_count(), 3);
        assert!(result.result(StageId::Agape).unwrap().error.as_deref().unwrap().contains("circuit open"));

        clock.advance(Duration::from_secs(2));
        let result = run(&pipeline, FRUSTRATED).await;
        assert_eq!(result.success_flags, "10000");
        assert_eq!(client.call_count(), 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_live_calls() {
        let client = Arc::new(ScriptedLlmClient::repeating(AGAPE_JSON, 1));
        let pipeline = PipelineBuilder::new("test")
            .stage(live(StageId::Agape, client.clone()))
            .unwrap()
            .processing(ProcessingConfig::new().with_max_processing_time_ms(0))
            .build()
            .unwrap();

        let result = run(&pipeline, FRUSTRATED).await;

        assert_eq!(result.success_flags, "F0000");
        assert_eq!(client.call_count(), 0);
        assert!(result
            .result(StageId::Agape)
            .unwrap()
            .error
            .as_deref()
            .unwrap()
            .contains("fallback-only"));
    }
}
