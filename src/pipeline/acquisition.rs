//! Schema acquisition: root listing -> one sample per resource -> inferred schema.

use crate::datasource::{infer_schema, sample_url};
use crate::documents::{endpoint_document_name, schema_document_name};
use crate::error::PipelineError;
use crate::pipeline::StageContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// One resource's inferred schema, or why it could not be inferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub datasource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SchemaEntry {
    fn inferred(datasource: &str, schema: Value) -> Self {
        Self {
            datasource: datasource.to_string(),
            schema: Some(schema),
            error: None,
        }
    }

    fn failed(datasource: &str, error: impl Into<String>) -> Self {
        Self {
            datasource: datasource.to_string(),
            schema: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Resource name -> schema entry, across all configured datasources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    entries: BTreeMap<String, SchemaEntry>,
    owners: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaDocument {
    fn insert(&mut self, name: String, entry: SchemaEntry) {
        self.owners
            .entry(name.clone())
            .or_default()
            .insert(entry.datasource.clone());
        self.entries.insert(name, entry);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &SchemaEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The datasource that exposed `resource`, when exactly one did.
    pub fn sole_owner(&self, resource: &str) -> Option<&str> {
        let owners = self.owners.get(resource)?;
        if owners.len() == 1 {
            owners.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(name, entry)| {
                let value = serde_json::to_value(entry).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

/// Fetch and infer schemas for every configured datasource, then persist the document.
///
/// Per-resource and per-listing failures become error entries; only a storage failure
/// aborts the stage.
pub async fn acquire_schemas(ctx: &StageContext) -> Result<SchemaDocument, PipelineError> {
    let endpoints = &ctx.config.datasources.endpoints;
    info!(endpoints = endpoints.len(), "Acquiring datasource schemas");

    let mut document = SchemaDocument::default();
    for endpoint in endpoints {
        let mut per_endpoint = SchemaDocument::default();
        acquire_endpoint(ctx, endpoint, &mut per_endpoint).await;

        ctx.documents
            .write(&endpoint_document_name(endpoint), &per_endpoint.to_value())?;
        for (name, entry) in per_endpoint.entries {
            document.insert(name, entry);
        }
    }

    ctx.documents
        .write(&schema_document_name(endpoints), &document.to_value())?;

    let failed = document.entries().filter(|(_, e)| e.is_error()).count();
    info!(resources = document.len(), failed, "Datasource schemas acquired");
    Ok(document)
}

async fn acquire_endpoint(ctx: &StageContext, endpoint: &str, document: &mut SchemaDocument) {
    let headers = ctx.config.datasources.headers_for(endpoint);

    let listing = match ctx.fetcher.get_json(endpoint, &headers).await {
        Ok(response) => response.into_success_body(endpoint),
        Err(e) => Err(e),
    };
    let listing = match listing {
        Ok(Value::Object(listing)) => listing,
        Ok(other) => {
            warn!(endpoint, "Root listing is not a JSON object");
            document.insert(
                endpoint.to_string(),
                SchemaEntry::failed(
                    endpoint,
                    format!("root listing is not a JSON object (got {})", json_kind(&other)),
                ),
            );
            return;
        }
        Err(e) => {
            warn!(endpoint, error = %e, "Root listing fetch failed");
            document.insert(endpoint.to_string(), SchemaEntry::failed(endpoint, e.to_string()));
            return;
        }
    };

    for (name, url) in listing {
        let Some(url) = url.as_str() else {
            document.insert(
                name,
                SchemaEntry::failed(endpoint, "resource URL is not a string"),
            );
            continue;
        };

        let sample = sample_url(url);
        debug!(endpoint, resource = %name, sample = %sample, "Fetching resource sample");
        let entry = match ctx.fetcher.get_json(&sample, &headers).await {
            Ok(response) => match response.into_success_body(&sample) {
                Ok(body) => SchemaEntry::inferred(endpoint, infer_schema(&body)),
                Err(e) => SchemaEntry::failed(endpoint, e.to_string()),
            },
            Err(e) => SchemaEntry::failed(endpoint, e.to_string()),
        };
        if let Some(error) = &entry.error {
            warn!(endpoint, resource = %name, error = %error, "Resource sample failed");
        }
        document.insert(name, entry);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
