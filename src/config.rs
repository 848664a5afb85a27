//! Configuration System
//!
//! Layered configuration: merge-policy defaults, the global config file, workspace config
//! files, `WIDGETFORGE__*` environment variables, and finally the datasource environment
//! variables the service has always honored (`DATASOURCES_API_ENDPOINTS`, ...).
//! The result is one explicit `ForgeConfig` value, built once and shared by reference.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::provider::{ProviderConfig, ProviderType};

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod environment;
    pub mod global_file;
    pub mod workspace_file;
}

pub use facade::ConfigLoader;
pub use sources::environment::apply_overrides_from;
pub use sources::global_file::global_config_path;

/// Request headers for one datasource, keyed by header name.
pub type HeaderMap = BTreeMap<String, String>;

const BEARER_PREFIX: &str = "Bearer ";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// REST datasources to discover
    #[serde(default)]
    pub datasources: DatasourceConfig,

    /// Language model provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Idea proposal and widget generation
    #[serde(default)]
    pub generation: GenerationConfig,

    /// End-to-end chaining (poll cadence and ceiling)
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Background job workers
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Storage paths
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Datasource endpoints and their request headers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasourceConfig {
    /// Ordered list of datasource base URLs
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Base URL -> request headers (may carry `Authorization: Bearer ...`)
    #[serde(default)]
    pub auth_headers: BTreeMap<String, HeaderMap>,
}

impl DatasourceConfig {
    /// Headers for a datasource, looked up by exact base URL.
    pub fn headers_for(&self, base_url: &str) -> HeaderMap {
        self.auth_headers.get(base_url).cloned().unwrap_or_default()
    }

    /// Base URLs whose headers carry a Bearer-style Authorization value.
    pub fn bearer_endpoints(&self) -> Vec<String> {
        self.auth_headers
            .iter()
            .filter(|(_, headers)| has_bearer_authorization(headers))
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn requires_bearer(&self, base_url: &str) -> bool {
        self.auth_headers
            .get(base_url)
            .map(has_bearer_authorization)
            .unwrap_or(false)
    }

    /// Auth context for an idea's endpoint reference: the configured base URL that
    /// prefixes it. The longest matching prefix wins.
    pub fn match_auth_context(&self, endpoint_ref: &str) -> Option<(&str, &HeaderMap)> {
        self.auth_headers
            .iter()
            .filter(|(url, _)| !url.is_empty() && endpoint_ref.starts_with(url.as_str()))
            .max_by_key(|(url, _)| url.len())
            .map(|(url, headers)| (url.as_str(), headers))
    }
}

fn has_bearer_authorization(headers: &HeaderMap) -> bool {
    headers.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("authorization") && value.starts_with(BEARER_PREFIX)
    })
}

/// Idea proposal and widget generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Exact number of widget ideas requested from the model
    #[serde(default = "default_idea_count")]
    pub idea_count: usize,

    /// Maximum concurrent per-idea generation calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Optional replacement for the built-in widget generation template
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

pub const DEFAULT_IDEA_COUNT: usize = 3;

fn default_idea_count() -> usize {
    DEFAULT_IDEA_COUNT
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            idea_count: default_idea_count(),
            max_concurrent: default_max_concurrent(),
            template_path: None,
        }
    }
}

/// Poll cadence for the end-to-end driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_max_poll_attempts() -> u32 {
    1_200
}

impl OrchestrationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

/// Background job worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

fn default_workers() -> usize {
    2
}

fn default_max_queue_size() -> usize {
    1_000
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory; relative paths resolve against the workspace root
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".widgetforge/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_store_path(&self, workspace_root: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            workspace_root.join(&self.store_path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Datasource(String, String),
    Provider(String),
    Generation(String),
    Jobs(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Datasource(url, msg) => write!(f, "Datasource '{}': {}", url, msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::Jobs(msg) => write!(f, "Jobs: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ForgeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for url in &self.datasources.endpoints {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError::Datasource(
                    url.clone(),
                    "endpoint must be an http(s) URL".to_string(),
                ));
            }
        }

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }

        if self.generation.idea_count == 0 {
            errors.push(ValidationError::Generation(
                "idea_count must be a positive integer".to_string(),
            ));
        }
        if self.generation.max_concurrent == 0 {
            errors.push(ValidationError::Generation(
                "max_concurrent must be at least 1".to_string(),
            ));
        }

        if self.jobs.workers == 0 {
            errors.push(ValidationError::Jobs(
                "workers must be at least 1".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
