//! Prompt builders for the three model-backed stages.

use crate::config::HeaderMap;
use serde_json::{json, Value};

pub const WIDGET_DESCRIPTION_PLACEHOLDER: &str = "{{WIDGET_DESCRIPTION}}";
pub const OPENAPI_SCHEMA_PLACEHOLDER: &str = "{{OPENAPI_SCHEMA}}";
pub const AUTH_CONTEXT_PLACEHOLDER: &str = "{{AUTH_CONTEXT}}";

/// System message for specification synthesis.
pub const SYNTHESIS_ROLE: &str = "You are an expert API designer.";

/// System message for idea proposal.
pub const PROPOSAL_ROLE: &str = "You are an expert dashboard widget designer and frontend engineer.";

pub fn synthesis_prompt(endpoints: &[String], bearer_endpoints: &[String], schemas: &Value) -> String {
    let servers: Vec<Value> = endpoints.iter().map(|url| json!({ "url": url })).collect();
    format!(
        "Given the following discovered API endpoints and their \
JSON schemas, generate a complete, valid OpenAPI 3.1.1 specification (in JSON, not YAML) that \
describes these endpoints. Follow the OpenAPI 3.1.1 specification strictly. Include all required \
fields: openapi, info, servers, paths, components.\n\
For the 'servers' field, use the following actual endpoint URLs (do NOT use example.com or \
placeholders):\n{servers}\n\
Use the schemas as the basis for the components/schemas section. For each endpoint, infer the \
HTTP method (GET if unknown), and create a path with a response schema. If you are unsure about \
details, make reasonable assumptions.\n\
IMPORTANT: The following endpoints require an Authorization header with a Bearer token and must \
have security: [{{\"bearerAuth\": []}}]:\n{bearer}\n\
You MUST include a securitySchemes section in components with a bearerAuth scheme (type: http, \
scheme: bearer, bearerFormat: JWT). Add the bearerAuth security requirement ONLY to the \
operations of the endpoints listed above; do NOT add security to any other endpoint.\n\
Discovered schemas:\n{schemas}\n\
Respond ONLY with the OpenAPI 3.1.1 JSON object, no explanation or markdown.",
        servers = pretty(&Value::Array(servers)),
        bearer = pretty(&json!(bearer_endpoints)),
        schemas = pretty(schemas),
    )
}

pub fn proposal_prompt(specification: &Value, count: usize) -> String {
    format!(
        "You are given an OpenAPI 3.1.1 specification describing a set of API endpoints. Suggest {count} complete, \
general-purpose widget ideas that could be built using these endpoints. Each widget must be \
standalone and use only data fetched from the provided endpoints.\n\
For each idea, output a JSON object with the following fields:\n\
- widget_title: (string) a short, descriptive title\n\
- widget_description: (string) a comprehensive description of what the widget does and why it is useful\n\
- endpoint: (string) the full URL of the API endpoint(s) used\n\
- data_combination: (string) a step-by-step explanation of exactly which fields (including nested \
fields) to fetch and combine from which endpoint(s), and how to filter and sort them\n\
- react_fetch_example: (string) a copy-paste ready React fetch snippet (no imports) that fetches \
and combines the data for this widget\n\
Guardrails:\n\
- Output exactly {count} ideas as a JSON array of objects.\n\
- All fields must be strings. If you are unsure, use an empty string.\n\
- Output ONLY the JSON array, without commentary or markdown.\n\
OpenAPI 3.1.1 specification:\n{spec}\n\
Respond ONLY with the JSON array.",
        count = count,
        spec = pretty(specification),
    )
}

/// Built-in widget generation template.
pub const DEFAULT_WIDGET_TEMPLATE: &str = "You are a senior React engineer. Write one self-contained \
React function component (JSX, hooks only, no external UI libraries) implementing the widget below.

Widget description:
{{WIDGET_DESCRIPTION}}

Authentication:
{{AUTH_CONTEXT}}

The component must fetch its data at runtime from the API described by this OpenAPI 3.1.1 \
specification, handle loading and error states, and render the data described above. Use the \
server URLs from the specification exactly as given.

OpenAPI specification:
{{OPENAPI_SCHEMA}}

Respond with the component source code only.";

pub fn widget_prompt(template: &str, description: &str, specification: &str, auth_context: &str) -> String {
    template
        .replace(WIDGET_DESCRIPTION_PLACEHOLDER, description)
        .replace(AUTH_CONTEXT_PLACEHOLDER, auth_context)
        .replace(OPENAPI_SCHEMA_PLACEHOLDER, specification)
}

/// Narrative describing which headers the widget's requests need.
///
/// Header values are never placed in the prompt; bearer tokens are shown as `Bearer <token>`.
pub fn auth_context(matched: Option<(&str, &HeaderMap)>) -> String {
    let Some((base_url, headers)) = matched else {
        return "The endpoint does not require authentication headers.".to_string();
    };
    if headers.is_empty() {
        return format!("Requests to {} need no additional headers.", base_url);
    }
    let lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            let shown = if value.starts_with("Bearer ") {
                "Bearer <token>"
            } else {
                "<value>"
            };
            format!("- {}: {}", name, shown)
        })
        .collect();
    format!(
        "Requests to {} must send these headers (values are provided at runtime through an \
`authHeaders` prop):\n{}",
        base_url,
        lines.join("\n")
    )
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
