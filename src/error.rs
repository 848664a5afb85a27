//! Error types for the widgetforge pipeline.

use crate::jobs::{JobId, JobStatus};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Failed to open store: {0}")]
    OpenFailed(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

/// Pipeline, job and provider errors
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job queue is full ({0} pending)")]
    QueueFull(usize),

    #[error("Job queue is not running")]
    QueueStopped,

    #[error("Timed out after {attempts} poll attempts waiting for job {job_id}")]
    Timeout { job_id: JobId, attempts: u32 },

    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    #[error("Datasource fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    pub fn stage_failed(stage: &str, message: impl Into<String>) -> Self {
        PipelineError::StageFailed {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::StorageError(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
