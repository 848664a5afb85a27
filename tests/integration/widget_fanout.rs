//! Integration tests for per-idea code fan-out
//!
//! Tests cover:
//! - Output order equals input order under staggered latencies
//! - The concurrency bound
//! - Per-item failure isolation
//! - Auth context in prompts without secret values
//! - Template override files

use super::test_utils::{idea_list, stage_context, two_datasource_config, ScriptedProvider, StubFetcher};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use widgetforge::error::PipelineError;
use widgetforge::pipeline::{generate_widgets, validate_ideas, WidgetIdea};

fn ideas(count: usize) -> Vec<WidgetIdea> {
    validate_ideas(&idea_list(count).to_string(), count)
        .ideas()
        .unwrap()
        .to_vec()
}

fn item_index(prompt: &str) -> usize {
    let marker = "Shows data set ";
    let start = prompt.find(marker).unwrap() + marker.len();
    prompt[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_order_is_preserved_under_staggered_latency() {
    let count = 6;
    // Earlier items finish last.
    let provider = Arc::new(ScriptedProvider::from_fn(move |_, prompt| {
        let index = item_index(prompt);
        (
            Duration::from_millis(((count - index) * 15) as u64),
            Ok(format!("code-{}", index)),
        )
    }));
    let mut config = two_datasource_config();
    config.generation.max_concurrent = 3;
    let (ctx, _) = stage_context(config, provider.clone(), Arc::new(StubFetcher::new()));

    let widgets = generate_widgets(&ctx, &json!({"openapi": "3.1.1"}), &ideas(count))
        .await
        .unwrap();

    assert_eq!(widgets.len(), count);
    for (index, widget) in widgets.iter().enumerate() {
        assert_eq!(widget.widget_title, format!("Widget {}", index));
        assert_eq!(widget.code.as_deref(), Some(format!("code-{}", index).as_str()));
    }
    assert_eq!(provider.calls(), count);
    assert!(provider.max_in_flight() <= 3);
    assert!(provider.max_in_flight() > 1, "generation should overlap");
}

#[tokio::test]
async fn test_one_failure_does_not_sink_the_batch() {
    let provider = Arc::new(ScriptedProvider::from_fn(|_, prompt| {
        let index = item_index(prompt);
        let reply = if index == 1 {
            Err(PipelineError::ProviderRequestFailed("upstream 502".to_string()))
        } else {
            Ok(format!("code-{}", index))
        };
        (Duration::from_millis(5), reply)
    }));
    let (ctx, _) = stage_context(two_datasource_config(), provider, Arc::new(StubFetcher::new()));

    let widgets = generate_widgets(&ctx, &json!({}), &ideas(3)).await.unwrap();
    assert_eq!(widgets[0].code.as_deref(), Some("code-0"));
    assert!(widgets[1].code.is_none());
    assert!(widgets[1].error.as_deref().unwrap().contains("upstream 502"));
    assert_eq!(widgets[2].code.as_deref(), Some("code-2"));
}

#[tokio::test]
async fn test_prompts_carry_redacted_auth_context() {
    let provider = Arc::new(ScriptedProvider::from_fn(|_, _| {
        (Duration::ZERO, Ok("code".to_string()))
    }));
    let mut config = two_datasource_config();
    config.generation.max_concurrent = 1;
    let (ctx, _) = stage_context(config, provider.clone(), Arc::new(StubFetcher::new()));

    generate_widgets(&ctx, &json!({"openapi": "3.1.1"}), &ideas(2))
        .await
        .unwrap();

    let prompts = provider.prompts();
    let public = prompts.iter().find(|p| item_index(p) == 0).unwrap();
    let secure = prompts.iter().find(|p| item_index(p) == 1).unwrap();
    assert!(public.contains("does not require authentication"));
    assert!(secure.contains("Authorization: Bearer <token>"));
    assert!(prompts.iter().all(|p| !p.contains("s3cret")));
    assert!(prompts.iter().all(|p| p.contains("\"openapi\": \"3.1.1\"")));
}

#[tokio::test]
async fn test_template_override_is_used() {
    let temp = tempfile::tempdir().unwrap();
    let template = temp.path().join("widget.tmpl");
    std::fs::write(&template, "CUSTOM {{WIDGET_DESCRIPTION}} | {{AUTH_CONTEXT}}").unwrap();

    let provider = Arc::new(ScriptedProvider::from_fn(|_, _| {
        (Duration::ZERO, Ok("code".to_string()))
    }));
    let mut config = two_datasource_config();
    config.generation.template_path = Some(template);
    let (ctx, _) = stage_context(config, provider.clone(), Arc::new(StubFetcher::new()));

    generate_widgets(&ctx, &json!({}), &ideas(1)).await.unwrap();
    assert!(provider.prompts()[0].starts_with("CUSTOM Shows data set 0 |"));
}
