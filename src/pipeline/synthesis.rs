//! Specification synthesis: schema set -> model -> OpenAPI document with enforced
//! server list and bearer security.

use crate::config::DatasourceConfig;
use crate::documents::SPECIFICATION_DOCUMENT;
use crate::error::PipelineError;
use crate::pipeline::acquisition::SchemaDocument;
use crate::pipeline::{parse_model_json, prompts, StageContext};
use crate::provider::{ChatMessage, CompletionOptions};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

pub const BEARER_SCHEME: &str = "bearerAuth";

const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

pub(crate) fn synthesis_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(0.2),
        max_tokens: Some(20_000),
        ..CompletionOptions::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Specification(Value),
    /// The model reply was not a JSON object; `raw_response` is the exact reply text.
    Malformed { error: String, raw_response: String },
}

impl SynthesisOutcome {
    /// Job result payload: `{"type": "openapi", "schema": ..}` or `{"error", "raw_response"}`.
    pub fn to_job_result(&self) -> Value {
        match self {
            SynthesisOutcome::Specification(spec) => json!({ "type": "openapi", "schema": spec }),
            SynthesisOutcome::Malformed {
                error,
                raw_response,
            } => json!({ "error": error, "raw_response": raw_response }),
        }
    }

    pub fn specification(&self) -> Option<&Value> {
        match self {
            SynthesisOutcome::Specification(spec) => Some(spec),
            SynthesisOutcome::Malformed { .. } => None,
        }
    }
}

/// Ask the model for a specification of `schemas`, enforce invariants, persist it.
pub async fn synthesize_specification(
    ctx: &StageContext,
    schemas: &SchemaDocument,
) -> Result<SynthesisOutcome, PipelineError> {
    let datasources = &ctx.config.datasources;
    let prompt = prompts::synthesis_prompt(
        &datasources.endpoints,
        &datasources.bearer_endpoints(),
        &schemas.to_value(),
    );

    info!(
        resources = schemas.len(),
        model = ctx.provider.model_name(),
        "Requesting specification synthesis"
    );
    let response = ctx
        .provider
        .complete(
            vec![ChatMessage::system(prompts::SYNTHESIS_ROLE), ChatMessage::user(prompt)],
            synthesis_options(),
        )
        .await?;
    let raw = response.content;

    let mut specification = match parse_model_json(&raw) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) => {
            warn!("Synthesis reply is JSON but not an object");
            return Ok(SynthesisOutcome::Malformed {
                error: "Specification must be a JSON object".to_string(),
                raw_response: raw,
            });
        }
        Err(e) => {
            warn!(error = %e, "Synthesis reply is not valid JSON");
            return Ok(SynthesisOutcome::Malformed {
                error: format!("Failed to parse LLM response as JSON: {}", e),
                raw_response: raw,
            });
        }
    };

    enforce_invariants(&mut specification, datasources, schemas);
    ctx.documents.write(SPECIFICATION_DOCUMENT, &specification)?;
    info!(document = SPECIFICATION_DOCUMENT, "Specification persisted");
    Ok(SynthesisOutcome::Specification(specification))
}

/// Overwrite `servers` with the configured endpoints and rewrite per-operation security so
/// that only operations of Bearer-configured datasources carry `bearerAuth`.
pub fn enforce_invariants(spec: &mut Value, datasources: &DatasourceConfig, schemas: &SchemaDocument) {
    let Some(root) = spec.as_object_mut() else {
        return;
    };

    let servers: Vec<Value> = datasources
        .endpoints
        .iter()
        .map(|url| json!({ "url": url }))
        .collect();
    root.insert("servers".to_string(), Value::Array(servers));

    // A global requirement would apply bearerAuth to every path.
    root.remove("security");

    let candidates = candidate_datasources(datasources);
    if let Some(Value::Object(paths)) = root.get_mut("paths") {
        for (path, item) in paths.iter_mut() {
            let owner = resolve_datasource(path, item, &candidates, schemas);
            let secured = owner.map_or(false, |ds| datasources.requires_bearer(ds));
            debug!(path = %path, datasource = ?owner, secured, "Applying path security");
            apply_security(item, secured);
        }
    }

    if !datasources.bearer_endpoints().is_empty() {
        ensure_bearer_scheme(root);
    }
}

fn candidate_datasources(datasources: &DatasourceConfig) -> Vec<String> {
    let mut candidates = datasources.endpoints.clone();
    for url in datasources.auth_headers.keys() {
        if !candidates.contains(url) {
            candidates.push(url.clone());
        }
    }
    candidates
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// The path component of an absolute URL (`https://h/api/v2/` -> `/api/v2/`).
fn url_path(url: &str) -> Option<&str> {
    let after_scheme = url.split_once("://").map(|(_, rest)| rest)?;
    after_scheme.find('/').map(|idx| &after_scheme[idx..])
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return false;
    }
    path == trimmed || path.starts_with(&format!("{}/", trimmed))
}

/// Which datasource a path belongs to. First matching rule wins:
/// path-item server, absolute path key, endpoint URL path, then a resource name
/// exposed by exactly one datasource.
pub fn resolve_datasource<'a>(
    path: &str,
    item: &Value,
    candidates: &'a [String],
    schemas: &SchemaDocument,
) -> Option<&'a str> {
    if let Some(server) = item
        .get("servers")
        .and_then(|s| s.get(0))
        .and_then(|s| s.get("url"))
        .and_then(Value::as_str)
    {
        if let Some(found) = candidates.iter().find(|c| same_url(c, server)) {
            return Some(found.as_str());
        }
    }

    if let Some(found) = candidates
        .iter()
        .filter(|c| path.starts_with(c.trim_end_matches('/')))
        .max_by_key(|c| c.len())
    {
        return Some(found.as_str());
    }

    let mut by_url_path: Vec<(&'a String, usize)> = candidates
        .iter()
        .filter_map(|c| {
            let prefix = url_path(c)?;
            path_has_prefix(path, prefix).then(|| (c, prefix.trim_end_matches('/').len()))
        })
        .collect();
    by_url_path.sort_by(|a, b| b.1.cmp(&a.1));
    match by_url_path.as_slice() {
        [(only, _)] => return Some(only.as_str()),
        [(first, a), (_, b), ..] if a > b => return Some(first.as_str()),
        _ => {}
    }

    let resource = path
        .trim_start_matches('/')
        .split('/')
        .find(|segment| !segment.is_empty())?;
    let owner = schemas.sole_owner(resource)?;
    candidates.iter().find(|c| c.as_str() == owner).map(String::as_str)
}

fn apply_security(item: &mut Value, secured: bool) {
    let Some(item) = item.as_object_mut() else {
        return;
    };
    item.remove("security");
    for method in OPERATION_METHODS {
        if let Some(Value::Object(operation)) = item.get_mut(method) {
            if secured {
                operation.insert(
                    "security".to_string(),
                    json!([{ BEARER_SCHEME: [] }]),
                );
            } else {
                operation.remove("security");
            }
        }
    }
}

fn ensure_bearer_scheme(root: &mut Map<String, Value>) {
    let components = root
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()));
    if !components.is_object() {
        *components = Value::Object(Map::new());
    }
    let Some(components) = components.as_object_mut() else {
        return;
    };
    let schemes = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()));
    if !schemes.is_object() {
        *schemes = Value::Object(Map::new());
    }
    if let Some(schemes) = schemes.as_object_mut() {
        schemes.insert(
            BEARER_SCHEME.to_string(),
            json!({ "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }),
        );
    }
}
