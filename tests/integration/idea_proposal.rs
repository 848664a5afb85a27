//! Integration tests for idea proposal
//!
//! Tests cover:
//! - Exactly N ideas accepted, in reply order
//! - Count mismatches rejected with the raw reply
//! - Configured count reaches the prompt

use super::test_utils::{idea_list, stage_context, two_datasource_config, ScriptedProvider, StubFetcher};
use serde_json::json;
use std::sync::Arc;
use widgetforge::error::PipelineError;
use widgetforge::pipeline::{propose_ideas, ProposalOutcome};

#[tokio::test]
async fn test_exact_count_is_accepted() {
    let reply = idea_list(2).to_string();
    let provider = Arc::new(ScriptedProvider::replies(vec![reply.as_str()]));
    let (ctx, _) = stage_context(two_datasource_config(), provider.clone(), Arc::new(StubFetcher::new()));

    let outcome = propose_ideas(&ctx, &json!({"openapi": "3.1.1"})).await.unwrap();
    let ideas = outcome.ideas().unwrap();
    assert_eq!(ideas.len(), 2);
    assert_eq!(ideas[0].widget_title, "Widget 0");
    assert_eq!(ideas[1].widget_title, "Widget 1");
    assert!(ideas.iter().all(|idea| !idea.was_coerced()));

    assert!(provider.prompts()[0].contains("Output exactly 2 ideas"));
}

#[tokio::test]
async fn test_count_mismatch_is_rejected_with_raw_reply() {
    let reply = idea_list(3).to_string();
    let (ctx, _) = stage_context(
        two_datasource_config(),
        Arc::new(ScriptedProvider::replies(vec![reply.as_str()])),
        Arc::new(StubFetcher::new()),
    );

    let outcome = propose_ideas(&ctx, &json!({"openapi": "3.1.1"})).await.unwrap();
    match outcome {
        ProposalOutcome::Rejected {
            error,
            raw_response,
        } => {
            assert!(error.contains("exactly 2"));
            assert_eq!(raw_response, reply);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_model_failure_is_a_stage_error() {
    let (ctx, _) = stage_context(
        two_datasource_config(),
        Arc::new(ScriptedProvider::failing(PipelineError::ProviderRateLimit(
            "429".to_string(),
        ))),
        Arc::new(StubFetcher::new()),
    );
    assert!(matches!(
        propose_ideas(&ctx, &json!({})).await,
        Err(PipelineError::ProviderRateLimit(_))
    ));
}
