//! Integration tests for specification synthesis
//!
//! Tests cover:
//! - `servers` always replaced by the configured endpoints
//! - Bearer security only on operations of Bearer-configured datasources
//! - Malformed replies returned with the exact raw text and nothing persisted
//! - Model failures propagate as stage errors

use super::test_utils::{
    model_specification, stage_context, two_datasource_config, two_datasource_fetcher,
    ScriptedProvider, PUBLIC_API, SECURE_API,
};
use serde_json::{json, Value};
use std::sync::Arc;
use widgetforge::documents::{DocumentStore, SPECIFICATION_DOCUMENT};
use widgetforge::error::PipelineError;
use widgetforge::pipeline::{acquire_schemas, synthesize_specification, SynthesisOutcome};

fn operation_security(spec: &Value, path: &str) -> Option<Value> {
    spec["paths"][path]["get"].get("security").cloned()
}

#[tokio::test]
async fn test_servers_and_security_are_enforced() {
    let reply = model_specification().to_string();
    let provider = Arc::new(ScriptedProvider::replies(vec![reply.as_str()]));
    let (ctx, documents) = stage_context(
        two_datasource_config(),
        provider.clone(),
        Arc::new(two_datasource_fetcher()),
    );

    let schemas = acquire_schemas(&ctx).await.unwrap();
    let outcome = synthesize_specification(&ctx, &schemas).await.unwrap();
    let spec = outcome.specification().unwrap().clone();

    assert_eq!(
        spec["servers"],
        json!([{"url": PUBLIC_API}, {"url": SECURE_API}])
    );
    assert!(spec.get("security").is_none());

    assert_eq!(operation_security(&spec, "/api/v2/pokemon/{id}/"), None);
    assert_eq!(operation_security(&spec, "/berry/{id}"), None);
    assert_eq!(
        operation_security(&spec, "/api/accounts/{id}"),
        Some(json!([{"bearerAuth": []}]))
    );
    assert_eq!(
        spec["components"]["securitySchemes"]["bearerAuth"],
        json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"})
    );

    assert_eq!(documents.read(SPECIFICATION_DOCUMENT).unwrap(), Some(spec));

    // The prompt names the literal endpoints and the bearer datasource.
    let prompt = &provider.prompts()[0];
    assert!(prompt.starts_with("You are an expert API designer.\n\n"));
    assert!(prompt.contains(PUBLIC_API));
    assert!(prompt.contains(SECURE_API));
    assert!(prompt.contains("accounts"));
    assert!(!prompt.contains("s3cret"));
}

#[tokio::test]
async fn test_path_item_server_wins_over_path_shape() {
    let reply = json!({
        "openapi": "3.1.1",
        "paths": {
            "/pokemon/{id}": {
                "servers": [{"url": SECURE_API}],
                "get": {"responses": {}}
            }
        },
        "components": {}
    })
    .to_string();
    let (ctx, _) = stage_context(
        two_datasource_config(),
        Arc::new(ScriptedProvider::replies(vec![reply.as_str()])),
        Arc::new(two_datasource_fetcher()),
    );

    let schemas = acquire_schemas(&ctx).await.unwrap();
    let outcome = synthesize_specification(&ctx, &schemas).await.unwrap();
    let spec = outcome.specification().unwrap();
    assert_eq!(
        operation_security(spec, "/pokemon/{id}"),
        Some(json!([{"bearerAuth": []}]))
    );
}

#[tokio::test]
async fn test_no_bearer_datasource_means_no_security_anywhere() {
    let mut config = two_datasource_config();
    config.datasources.auth_headers.clear();
    let reply = model_specification().to_string();
    let (ctx, _) = stage_context(
        config,
        Arc::new(ScriptedProvider::replies(vec![reply.as_str()])),
        Arc::new(two_datasource_fetcher()),
    );

    let schemas = acquire_schemas(&ctx).await.unwrap();
    let outcome = synthesize_specification(&ctx, &schemas).await.unwrap();
    let spec = outcome.specification().unwrap();
    for path in ["/api/v2/pokemon/{id}/", "/api/accounts/{id}", "/berry/{id}"] {
        assert_eq!(operation_security(spec, path), None, "{} should be open", path);
    }
}

#[tokio::test]
async fn test_malformed_reply_is_data_not_an_error() {
    let raw = "Sure! Here is your spec: openapi 3.1.1 ...";
    let (ctx, documents) = stage_context(
        two_datasource_config(),
        Arc::new(ScriptedProvider::replies(vec![raw])),
        Arc::new(two_datasource_fetcher()),
    );

    let schemas = acquire_schemas(&ctx).await.unwrap();
    let outcome = synthesize_specification(&ctx, &schemas).await.unwrap();
    match &outcome {
        SynthesisOutcome::Malformed { raw_response, .. } => assert_eq!(raw_response, raw),
        other => panic!("expected malformed outcome, got {:?}", other),
    }
    assert_eq!(outcome.to_job_result()["raw_response"], raw);
    assert!(documents.read(SPECIFICATION_DOCUMENT).unwrap().is_none());
}

#[tokio::test]
async fn test_fenced_reply_is_accepted() {
    let reply = format!("```json\n{}\n```", model_specification());
    let (ctx, _) = stage_context(
        two_datasource_config(),
        Arc::new(ScriptedProvider::replies(vec![reply.as_str()])),
        Arc::new(two_datasource_fetcher()),
    );
    let schemas = acquire_schemas(&ctx).await.unwrap();
    let outcome = synthesize_specification(&ctx, &schemas).await.unwrap();
    assert_eq!(outcome.to_job_result()["type"], "openapi");
}

#[tokio::test]
async fn test_model_failure_propagates() {
    let (ctx, _) = stage_context(
        two_datasource_config(),
        Arc::new(ScriptedProvider::failing(PipelineError::ProviderRequestFailed(
            "connection reset".to_string(),
        ))),
        Arc::new(two_datasource_fetcher()),
    );
    let schemas = acquire_schemas(&ctx).await.unwrap();
    assert!(matches!(
        synthesize_specification(&ctx, &schemas).await,
        Err(PipelineError::ProviderRequestFailed(_))
    ));
}
