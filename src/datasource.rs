//! REST datasource access: the fetch boundary and sample URL conventions.
//!
//! Datasources expose a root listing (resource name -> resource URL); one sample item per
//! resource is fetched and handed to [`inference::infer_schema`].

use crate::config::HeaderMap;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub mod inference;

pub use inference::infer_schema;

/// Decoded response of a datasource GET.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Value,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body of a 2xx response, or a `FetchFailed` naming the status.
    pub fn into_success_body(self, url: &str) -> Result<Value, PipelineError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(PipelineError::FetchFailed {
                url: url.to_string(),
                message: format!("unexpected status {}", self.status),
            })
        }
    }
}

/// HTTP GET of JSON documents from a datasource.
#[async_trait]
pub trait DatasourceFetcher: Send + Sync {
    async fn get_json(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, PipelineError>;
}

/// URL of the "first item" sample for a resource collection.
pub fn sample_url(resource_url: &str) -> String {
    if resource_url.ends_with('/') {
        format!("{}1/", resource_url)
    } else {
        format!("{}/1/", resource_url)
    }
}

const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, PipelineError> {
        let client = Client::builder()
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .timeout(FETCH_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DatasourceFetcher for HttpFetcher {
    async fn get_json(&self, url: &str, headers: &HeaderMap) -> Result<FetchResponse, PipelineError> {
        let fetch_failed = |message: String| PipelineError::FetchFailed {
            url: url.to_string(),
            message,
        };

        let mut request = self.client.get(url).header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| fetch_failed(e.to_string()))?;
        let status = response.status().as_u16();
        debug!(url, status, "Datasource responded");

        if !response.status().is_success() {
            return Ok(FetchResponse {
                status,
                body: Value::Null,
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| fetch_failed(format!("response is not JSON: {}", e)))?;
        Ok(FetchResponse { status, body })
    }
}
