//! Shared test utilities for integration tests
//!
//! Scripted model and datasource doubles plus a [`StageContext`] builder, so stage and
//! pipeline tests run without network access.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use widgetforge::config::{ForgeConfig, HeaderMap};
use widgetforge::datasource::{DatasourceFetcher, FetchResponse};
use widgetforge::documents::InMemoryDocumentStore;
use widgetforge::error::PipelineError;
use widgetforge::pipeline::StageContext;
use widgetforge::provider::{
    ChatMessage, CompletionOptions, CompletionResponse, ModelProviderClient, TokenUsage,
};

/// Reply produced for one model call: latency, then content or error.
pub type Reply = (Duration, Result<String, PipelineError>);

type Responder = Box<dyn Fn(usize, &str) -> Reply + Send + Sync>;

/// Model double driven by a function of (call index, prompt).
pub struct ScriptedProvider {
    responder: Responder,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(usize, &str) -> Reply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Replies in call order, instantly; calls past the script fail.
    pub fn replies(replies: Vec<&str>) -> Self {
        let replies: Vec<String> = replies.into_iter().map(str::to_string).collect();
        Self::from_fn(move |index, _| match replies.get(index) {
            Some(reply) => (Duration::ZERO, Ok(reply.clone())),
            None => (
                Duration::ZERO,
                Err(PipelineError::ProviderError("script exhausted".to_string())),
            ),
        })
    }

    pub fn failing(error: PipelineError) -> Self {
        Self::from_fn(move |_, _| (Duration::ZERO, Err(error.clone())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.prompts.lock().push(prompt.clone());

        let (delay, reply) = (self.responder)(index, &prompt);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        reply.map(|content| CompletionResponse {
            content,
            model: "scripted".to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Datasource double: canned responses by exact URL; unknown URLs fail to connect.
#[derive(Default)]
pub struct StubFetcher {
    routes: HashMap<String, FetchResponse>,
    requests: Mutex<Vec<(String, HeaderMap)>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, url: &str, body: Value) -> Self {
        self.routes
            .insert(url.to_string(), FetchResponse { status: 200, body });
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(
            url.to_string(),
            FetchResponse {
                status,
                body: Value::Null,
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<(String, HeaderMap)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DatasourceFetcher for StubFetcher {
    async fn get_json(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, PipelineError> {
        self.requests.lock().push((url.to_string(), headers.clone()));
        self.routes
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::FetchFailed {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
    }
}

/// Two-datasource fixture: a public one (`pokeapi`) and a Bearer-protected one (`secure`).
pub const PUBLIC_API: &str = "https://pokeapi.co/api/v2/";
pub const SECURE_API: &str = "https://secure.example/api/";

pub fn two_datasource_config() -> ForgeConfig {
    let mut config = ForgeConfig::default();
    config.datasources.endpoints = vec![PUBLIC_API.to_string(), SECURE_API.to_string()];
    let mut headers = HeaderMap::new();
    headers.insert("Authorization".to_string(), "Bearer s3cret".to_string());
    config
        .datasources
        .auth_headers
        .insert(SECURE_API.to_string(), headers);
    config.generation.idea_count = 2;
    config.orchestration.poll_interval_ms = 5;
    config.orchestration.max_poll_attempts = 400;
    config
}

pub fn two_datasource_fetcher() -> StubFetcher {
    StubFetcher::new()
        .with_json(
            PUBLIC_API,
            json!({
                "pokemon": "https://pokeapi.co/api/v2/pokemon/",
                "berry": "https://pokeapi.co/api/v2/berry/"
            }),
        )
        .with_json(
            "https://pokeapi.co/api/v2/pokemon/1/",
            json!({"id": 1, "name": "bulbasaur", "types": [{"slot": 1}]}),
        )
        .with_json(
            "https://pokeapi.co/api/v2/berry/1/",
            json!({"id": 1, "name": "cheri", "firmness": {"name": "soft"}}),
        )
        .with_json(
            SECURE_API,
            json!({"accounts": "https://secure.example/api/accounts"}),
        )
        .with_json(
            "https://secure.example/api/accounts/1/",
            json!({"id": 1, "balance": 12.5}),
        )
}

/// A specification the synthesis double returns; its servers and security are deliberately wrong.
pub fn model_specification() -> Value {
    json!({
        "openapi": "3.1.1",
        "info": {"title": "Combined", "version": "1.0.0"},
        "servers": [{"url": "https://example.com"}],
        "security": [{"bearerAuth": []}],
        "paths": {
            "/api/v2/pokemon/{id}/": {"get": {"security": [{"bearerAuth": []}], "responses": {}}},
            "/api/accounts/{id}": {"get": {"responses": {}}},
            "/berry/{id}": {"get": {"responses": {}}}
        },
        "components": {"schemas": {}}
    })
}

pub fn idea_list(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| {
                json!({
                    "widget_title": format!("Widget {}", i),
                    "widget_description": format!("Shows data set {}", i),
                    "endpoint": if i % 2 == 0 {
                        format!("{}pokemon/", PUBLIC_API)
                    } else {
                        format!("{}accounts", SECURE_API)
                    },
                    "data_combination": "combine fields",
                    "react_fetch_example": "fetch(url)"
                })
            })
            .collect(),
    )
}

/// Stage context over the given doubles and an in-memory document store.
pub fn stage_context(
    config: ForgeConfig,
    provider: Arc<ScriptedProvider>,
    fetcher: Arc<StubFetcher>,
) -> (StageContext, Arc<InMemoryDocumentStore>) {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let ctx = StageContext {
        config: Arc::new(config),
        provider,
        fetcher,
        documents: documents.clone(),
    };
    (ctx, documents)
}
