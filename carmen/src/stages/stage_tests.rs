//! Behavioural tests for the analysis stages.

#[cfg(test)]
mod tests {
    use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
    use crate::context::{ExecutionMode, StageContext, StageInputs};
    use crate::core::{JsonObject, StageId, StageOutcome, StageResult};
    use crate::fallback::FallbackProvider;
    use crate::llm::{
        AutoMockLlmClient, LlmClient, LlmResponse, MockLlmClient, ProviderError, ScriptedLlmClient,
    };
    use crate::stages::{AnalysisStage, LiveStrategy, Stage, StageDescriptor, StageSettings};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    const ERIS_JSON: &str = r#"```json
{"discord_detected": true, "root_cause": "Missing constraints", "root_cause_type": "constraint",
 "severity": "medium", "contributing_factors": ["budget"], "pattern_identified": "none",
 "prevention_strategy": "Ask first"}
```"#;

    fn context() -> StageContext {
        StageContext::new(Uuid::new_v4(), JsonObject::new(), StageInputs::default())
    }

    fn eris_stage(client: Arc<dyn LlmClient>, breaker: Option<Arc<CircuitBreaker>>) -> AnalysisStage {
        let mut live = LiveStrategy::new(client);
        if let Some(breaker) = breaker {
            live = live.with_breaker(breaker);
        }
        AnalysisStage::new(StageDescriptor::new(StageId::Eris))
            .unwrap()
            .with_live(live)
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "scripted",
            BreakerConfig::default().with_failure_threshold(threshold),
        ))
    }

    #[tokio::test]
    async fn test_no_client_uses_fallback() {
        let stage = AnalysisStage::new(StageDescriptor::new(StageId::Agape)).unwrap();
        let result = stage.run("I'm frustrated with this.", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert_eq!(result.error.as_deref(), Some("LLM client not provided"));
        assert_eq!(result.tokens_used, 0);
        assert_eq!(result.field("used_fallback"), Some(&json!(true)));
        assert_eq!(result.metadata["used_fallback"], json!(true));
    }

    #[tokio::test]
    async fn test_mock_client_runs_live() {
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new("mock", "mock-model"));
        let stage = AnalysisStage::new(StageDescriptor::new(StageId::Metis))
            .unwrap()
            .with_live(LiveStrategy::new(client));
        let result = stage.run("help", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Success);
        assert!(result.tokens_used > 0);
        assert_eq!(result.metadata["provider"], json!("mock"));
        assert_eq!(result.metadata["strategy"], json!("live"));
    }

    #[tokio::test]
    async fn test_fenced_live_output_accepted() {
        let client = Arc::new(ScriptedLlmClient::repeating(ERIS_JSON, 1));
        let stage = eris_stage(client.clone(), Some(breaker(3)));
        let result = stage.run("hi", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Success);
        assert_eq!(result.tokens_used, 15);
        assert_eq!(result.field("root_cause_type"), Some(&json!("constraint")));
        assert!(client.calls()[0].system.contains("You are the ERIS stage"));
        assert!(client.calls()[0].user.starts_with("User Message: hi"));
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back_and_counts_as_failure() {
        let client = Arc::new(ScriptedLlmClient::repeating(r#"{"severity": "medium"}"#, 1));
        let guard = breaker(3);
        let stage = eris_stage(client, Some(guard.clone()));
        let result = stage.run("I'm frustrated", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("Missing required field in ERIS output: discord_detected"));
        assert_eq!(guard.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_output_outside_breaker_when_configured() {
        let client: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::repeating("not json", 1));
        let guard = breaker(3);
        let settings = StageSettings::new().with_malformed_counts_as_failure(false);
        let stage = AnalysisStage::with_settings(StageDescriptor::new(StageId::Eris), settings)
            .unwrap()
            .with_live(LiveStrategy::new(client).with_breaker(guard.clone()));
        let result = stage.run("x", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert_eq!(guard.failure_count(), 0);
        assert_eq!(guard.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_the_call() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            Err(ProviderError::Transport("connection reset".to_string())),
            Ok(LlmResponse::new(ERIS_JSON, "scripted", "scripted-model")),
        ]));
        let guard = breaker(1);
        let stage = eris_stage(client.clone(), Some(guard.clone()));

        let first = stage.run("x", &context()).await.unwrap();
        assert_eq!(first.outcome, StageOutcome::Fallback);
        assert!(guard.is_open());

        let second = stage.run("x", &context()).await.unwrap();
        assert_eq!(second.outcome, StageOutcome::Fallback);
        assert_eq!(
            second.error.as_deref(),
            Some("circuit open - retry after 300 seconds")
        );
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_via_mockall() {
        let mut client = AutoMockLlmClient::new();
        client.expect_provider_name().return_const("grok".to_string());
        client.expect_model_name().return_const("grok-beta".to_string());
        client.expect_is_available().return_const(true);
        client
            .expect_generate_chat()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::AuthFailed("bad key".to_string())));

        let stage = eris_stage(Arc::new(client), None);
        let result = stage.run("x", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert!(result.error.as_deref().unwrap().contains("bad key"));
    }

    #[tokio::test]
    async fn test_missing_usage_is_estimated_not_counted() {
        let mut client = AutoMockLlmClient::new();
        client.expect_provider_name().return_const("grok".to_string());
        client.expect_model_name().return_const("grok-beta".to_string());
        client.expect_is_available().return_const(true);
        client
            .expect_generate_chat()
            .times(1)
            .returning(|_, _, _| Ok(LlmResponse::new(ERIS_JSON, "grok", "grok-beta")));

        let stage = eris_stage(Arc::new(client), None);
        let result = stage.run("x", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Success);
        assert_eq!(result.tokens_used, 0);
        assert_eq!(result.metadata["tokens_estimated"], json!(true));
        assert!(result.metadata["estimated_tokens"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_reported_usage_has_no_estimate() {
        let client = Arc::new(ScriptedLlmClient::repeating(ERIS_JSON, 1));
        let result = eris_stage(client, None).run("x", &context()).await.unwrap();

        assert_eq!(result.tokens_used, 15);
        assert!(!result.metadata.contains_key("tokens_estimated"));
        assert!(!result.metadata.contains_key("estimated_tokens"));
    }

    #[tokio::test]
    async fn test_unavailable_client_uses_fallback() {
        let client = Arc::new(ScriptedLlmClient::repeating(ERIS_JSON, 1).unavailable());
        let stage = eris_stage(client.clone(), None);
        let result = stage.run("x", &context()).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert_eq!(result.error.as_deref(), Some("LLM client scripted not available"));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_only_mode_skips_client() {
        let client = Arc::new(ScriptedLlmClient::repeating(ERIS_JSON, 1));
        let stage = eris_stage(client.clone(), None);
        let ctx = context().with_mode(ExecutionMode::FallbackOnly);
        let result = stage.run("x", &ctx).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_disabled_records_failure() {
        let stage = AnalysisStage::new(StageDescriptor::new(StageId::Thoth)).unwrap();
        let ctx = context().with_fallback_enabled(false);
        let result = stage.run("x", &ctx).await.unwrap();

        assert_eq!(result.outcome, StageOutcome::Failure);
        assert!(result.output.is_none());
    }

    #[tokio::test]
    async fn test_fallback_sees_degraded_dependency() {
        let results = vec![StageResult::failure(StageId::Agape, "down")];
        let inputs = StageInputs::resolve(
            &[StageId::Agape],
            &results,
            &StageId::ALL,
            "hello",
            &FallbackProvider::new(),
        );
        let ctx = StageContext::new(Uuid::new_v4(), JsonObject::new(), inputs);
        let stage = AnalysisStage::new(StageDescriptor::new(StageId::Eris)).unwrap();
        let result = stage.run("hello", &ctx).await.unwrap();

        assert_eq!(result.metadata["degraded_dependencies"], json!(["AGAPE"]));
        assert_eq!(result.metadata["context_stages"], json!(["AGAPE"]));
        assert_eq!(result.field("discord_detected"), Some(&json!(false)));
    }

    #[test]
    fn test_invalid_settings_rejected_at_construction() {
        let settings = StageSettings::new().with_option("max_root_causes", 0);
        let err = AnalysisStage::with_settings(StageDescriptor::new(StageId::Eris), settings).unwrap_err();
        assert!(err.message.contains("max_root_causes"));
    }
}
