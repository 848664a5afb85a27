//! Model Provider Abstraction
//!
//! One chat-completion interface over the language model backends the pipeline can use:
//! OpenAI, Ollama, and any local server speaking the OpenAI-compatible protocol.
//! Pipeline stages depend only on [`ModelProviderClient`], so tests substitute scripted
//! doubles without touching the network.

use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod profile;

pub use profile::{ProviderConfig, ProviderType};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,  // 0.0-2.0
    pub max_tokens: Option<u32>,   // Maximum tokens to generate
    pub top_p: Option<f32>,        // Nucleus sampling
    pub stop: Option<Vec<String>>, // Stop sequences
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Model provider client trait
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Generate a completion from a list of messages
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model name
    fn model_name(&self) -> &str;
}

// OpenAI-compatible API request/response structures
#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn role_to_string(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
    }
}

fn map_http_error(error: reqwest::Error) -> PipelineError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        PipelineError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        PipelineError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        PipelineError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, detail: String) -> PipelineError {
    match status {
        401 | 403 => PipelineError::ProviderAuthFailed(format!("Authentication failed: {}", detail)),
        429 => PipelineError::ProviderRateLimit(format!("Rate limit exceeded: {}", detail)),
        404 => PipelineError::ProviderModelNotFound(format!("Model not found: {}", detail)),
        _ => PipelineError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, detail
        )),
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Specification synthesis asks for up to 20k tokens; allow for slow completions.
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

fn build_provider_http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// Client for OpenAI and OpenAI-compatible servers (`/chat/completions`).
pub struct OpenAICompatibleClient {
    client: Client,
    provider_name: &'static str,
    model: String,
    api_key: Option<String>,
    completions_url: String,
}

impl OpenAICompatibleClient {
    pub fn openai(model: String, api_key: String, base_url: Option<String>) -> Result<Self, PipelineError> {
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client: build_provider_http_client()?,
            provider_name: "openai",
            model,
            api_key: Some(api_key),
            completions_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    /// Ollama serves the same protocol under `/v1`.
    pub fn ollama(model: String, base_url: Option<String>) -> Result<Self, PipelineError> {
        let base_url = base_url.unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client: build_provider_http_client()?,
            provider_name: "ollama",
            model,
            api_key: None,
            completions_url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn local(model: String, endpoint: String, api_key: Option<String>) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_provider_http_client()?,
            provider_name: "local",
            model,
            api_key,
            completions_url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ModelProviderClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|msg| OpenAIMessage {
                    role: role_to_string(msg.role).to_string(),
                    content: Some(msg.content),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: options.stop,
            stream: false,
        };

        debug!(
            provider = self.provider_name,
            model = %self.model,
            url = %self.completions_url,
            "Sending chat completion request"
        );

        let mut request_builder = self
            .client
            .post(&self.completions_url)
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request_builder
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::ProviderError("No choices in response".to_string()))?;

        let usage = completion
            .usage
            .map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model,
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Provider factory for creating provider clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ModelProviderClient>, PipelineError> {
        let model = config.model.clone();
        let client = match config.provider_type {
            ProviderType::OpenAI => {
                let api_key = config
                    .api_key
                    .clone()
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| {
                        PipelineError::ConfigError(
                            "openai provider requires an API key (set OPENAI_API_KEY)".to_string(),
                        )
                    })?;
                OpenAICompatibleClient::openai(model, api_key, config.endpoint.clone())?
            }
            ProviderType::Ollama => OpenAICompatibleClient::ollama(model, config.endpoint.clone())?,
            ProviderType::LocalCustom => {
                let endpoint = config.endpoint.clone().ok_or_else(|| {
                    PipelineError::ConfigError("local provider requires an endpoint".to_string())
                })?;
                OpenAICompatibleClient::local(model, endpoint, config.api_key.clone())?
            }
        };
        Ok(Arc::new(ConfiguredClient {
            inner: client,
            config: config.clone(),
        }))
    }
}

/// Applies the profile's default options beneath each stage's options.
struct ConfiguredClient {
    inner: OpenAICompatibleClient,
    config: ProviderConfig,
}

#[async_trait]
impl ModelProviderClient for ConfiguredClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError> {
        self.inner
            .complete(messages, self.config.merge_options(options))
            .await
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

// Mock provider for testing
#[cfg(test)]
pub(crate) struct MockProvider {
    responses: Vec<Result<String, PipelineError>>,
    current: parking_lot::Mutex<usize>,
    pub(crate) requests: parking_lot::Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
}

#[cfg(test)]
impl MockProvider {
    pub(crate) fn new(responses: Vec<&str>) -> Self {
        Self::with_results(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub(crate) fn with_results(responses: Vec<Result<String, PipelineError>>) -> Self {
        Self {
            responses,
            current: parking_lot::Mutex::new(0),
            requests: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ModelProviderClient for MockProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError> {
        self.requests.lock().push((messages, options));
        let response = {
            let mut idx = self.current.lock();
            let response = self
                .responses
                .get(*idx)
                .cloned()
                .unwrap_or_else(|| Ok("Mock response".to_string()));
            *idx += 1;
            response
        }?;

        Ok(CompletionResponse {
            content: response,
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            },
            finish_reason: Some("stop".to_string()),
        })
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
