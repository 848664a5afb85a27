//! Provider profile: which backend and model the pipeline talks to.

use crate::provider::CompletionOptions;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Supported provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    OpenAI,
    Ollama,
    /// Any server exposing an OpenAI-compatible `/chat/completions` route
    #[serde(rename = "local")]
    LocalCustom,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Ollama => "ollama",
            ProviderType::LocalCustom => "local",
        }
    }

    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("https://api.openai.com/v1"),
            ProviderType::Ollama => Some("http://localhost:11434"),
            ProviderType::LocalCustom => None,
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider_type: ProviderType,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to `OPENAI_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL override (required for `local`)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Options applied when a stage leaves a field unset
    #[serde(default)]
    pub default_options: CompletionOptions,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: ProviderType::default(),
            model: default_model(),
            api_key: None,
            endpoint: None,
            default_options: CompletionOptions::default(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        match self.provider_type {
            ProviderType::OpenAI if self.api_key.as_deref().map_or(true, str::is_empty) => {
                Err("openai provider requires an API key (set OPENAI_API_KEY)".to_string())
            }
            ProviderType::LocalCustom if self.endpoint.is_none() => {
                Err("local provider requires an endpoint".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Endpoint to call, falling back to the provider type's default.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint
            .clone()
            .or_else(|| self.provider_type.default_endpoint().map(str::to_string))
    }

    /// Stage options layered over this profile's defaults.
    pub fn merge_options(&self, stage: CompletionOptions) -> CompletionOptions {
        let defaults = &self.default_options;
        CompletionOptions {
            temperature: stage.temperature.or(defaults.temperature),
            max_tokens: stage.max_tokens.or(defaults.max_tokens),
            top_p: stage.top_p.or(defaults.top_p),
            stop: stage.stop.or_else(|| defaults.stop.clone()),
        }
    }
}
