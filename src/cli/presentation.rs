//! CLI presentation: format job, document and config results for text or JSON output.

use crate::config::{ForgeConfig, ValidationError};
use crate::error::PipelineError;
use crate::jobs::{JobRecord, JobSnapshot};
use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;

const REDACTED: &str = "<redacted>";

fn to_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::StorageError(format!("Failed to render JSON: {}", e)))
}

fn format_timestamp(ms: Option<u64>) -> String {
    ms.and_then(|ms| chrono::DateTime::from_timestamp_millis(ms as i64))
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}

/// Job listing as a table (text) or a JSON array of records.
pub fn format_job_list(records: &[JobRecord], format: &str) -> Result<String, PipelineError> {
    if format == "json" {
        return to_pretty(records);
    }
    if records.is_empty() {
        return Ok("No jobs found.".to_string());
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Job ID", "Kind", "Status", "Created", "Finished", "Error"]);
    for record in records {
        table.add_row(vec![
            record.job_id.to_string(),
            record.kind.clone(),
            record.status.to_string(),
            format_timestamp(Some(record.created_at_ms)),
            format_timestamp(record.finished_at_ms),
            record
                .error
                .as_deref()
                .map(|e| truncate(e, 60))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_job_snapshot(snapshot: &JobSnapshot) -> Result<String, PipelineError> {
    to_pretty(snapshot)
}

/// Result payload of a finished job; `null` when the job produced none.
pub fn format_job_result(result: Option<&Value>) -> Result<String, PipelineError> {
    to_pretty(result.unwrap_or(&Value::Null))
}

pub fn format_document(name: &str, document: Option<&Value>) -> Result<String, PipelineError> {
    match document {
        Some(document) => to_pretty(document),
        None => Ok(format!("Document '{}' has not been written yet.", name)),
    }
}

/// Effective configuration with the API key and every auth header value redacted.
pub fn format_config(config: &ForgeConfig) -> Result<String, PipelineError> {
    let mut redacted = config.clone();
    if redacted.provider.api_key.is_some() {
        redacted.provider.api_key = Some(REDACTED.to_string());
    }
    for headers in redacted.datasources.auth_headers.values_mut() {
        for value in headers.values_mut() {
            *value = REDACTED.to_string();
        }
    }
    to_pretty(&redacted)
}

pub fn format_validation_result(result: &Result<(), Vec<ValidationError>>) -> String {
    match result {
        Ok(()) => "Configuration is valid.".to_string(),
        Err(errors) => {
            let mut out = format!("Configuration has {} problem(s):", errors.len());
            for error in errors {
                out.push_str(&format!("\n  - {}", error));
            }
            out
        }
    }
}
