//! Legacy environment variables for datasources and generation.
//!
//! These variables carry JSON payloads. A malformed value never prevents startup: it falls
//! back to the empty/default value and logs a warning.

use crate::config::{ForgeConfig, HeaderMap, DEFAULT_IDEA_COUNT};
use std::collections::BTreeMap;
use tracing::warn;

pub const ENDPOINTS_VAR: &str = "DATASOURCES_API_ENDPOINTS";
pub const AUTH_HEADERS_VAR: &str = "DATASOURCE_AUTH_HEADERS";
pub const IDEA_COUNT_VAR: &str = "WIDGET_GENERATION_COUNT";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Apply overrides from the process environment.
pub fn apply_overrides(config: &mut ForgeConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to read variables.
pub fn apply_overrides_from<F>(config: &mut ForgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENDPOINTS_VAR) {
        config.datasources.endpoints = match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(variable = ENDPOINTS_VAR, error = %e, "Malformed JSON; using no endpoints");
                Vec::new()
            }
        };
    }

    if let Some(raw) = lookup(AUTH_HEADERS_VAR) {
        config.datasources.auth_headers =
            match serde_json::from_str::<BTreeMap<String, HeaderMap>>(&raw) {
                Ok(headers) => headers,
                Err(e) => {
                    warn!(variable = AUTH_HEADERS_VAR, error = %e, "Malformed JSON; using no auth headers");
                    BTreeMap::new()
                }
            };
    }

    if let Some(raw) = lookup(IDEA_COUNT_VAR) {
        config.generation.idea_count = match raw.trim().parse::<usize>() {
            Ok(count) if count > 0 => count,
            _ => {
                warn!(variable = IDEA_COUNT_VAR, value = %raw, "Invalid idea count; using default");
                DEFAULT_IDEA_COUNT
            }
        };
    }

    if config.provider.api_key.is_none() {
        config.provider.api_key = lookup(API_KEY_VAR).filter(|key| !key.is_empty());
    }
}
