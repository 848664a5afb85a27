//! Idea proposal: specification -> exactly N validated widget ideas.

use crate::error::PipelineError;
use crate::pipeline::{parse_model_json, prompts, StageContext};
use crate::provider::{ChatMessage, CompletionOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

const REQUIRED_FIELDS: [&str; 4] = [
    "widget_title",
    "widget_description",
    "endpoint",
    "data_combination",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetIdea {
    pub widget_title: String,
    pub widget_description: String,
    pub endpoint: String,
    pub data_combination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub react_fetch_example: Option<String>,
    /// Required fields that were missing or not strings and were replaced by `""`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coerced_fields: Vec<String>,
}

impl WidgetIdea {
    fn from_object(object: &Map<String, Value>) -> Self {
        let mut coerced_fields = Vec::new();
        let mut field = |name: &str| match object.get(name) {
            Some(Value::String(s)) => s.clone(),
            _ => {
                coerced_fields.push(name.to_string());
                String::new()
            }
        };
        let widget_title = field(REQUIRED_FIELDS[0]);
        let widget_description = field(REQUIRED_FIELDS[1]);
        let endpoint = field(REQUIRED_FIELDS[2]);
        let data_combination = field(REQUIRED_FIELDS[3]);

        Self {
            widget_title,
            widget_description,
            endpoint,
            data_combination,
            react_fetch_example: object
                .get("react_fetch_example")
                .and_then(Value::as_str)
                .map(str::to_string),
            coerced_fields,
        }
    }

    pub fn was_coerced(&self) -> bool {
        !self.coerced_fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProposalOutcome {
    Ideas(Vec<WidgetIdea>),
    Rejected { error: String, raw_response: String },
}

impl ProposalOutcome {
    pub fn ideas(&self) -> Option<&[WidgetIdea]> {
        match self {
            ProposalOutcome::Ideas(ideas) => Some(ideas),
            ProposalOutcome::Rejected { .. } => None,
        }
    }

    /// Ideas as a JSON list; a rejection is a single-element list `[{"error", "raw_response"}]`.
    pub fn to_value(&self) -> Value {
        match self {
            ProposalOutcome::Ideas(ideas) => serde_json::to_value(ideas).unwrap_or(Value::Null),
            ProposalOutcome::Rejected {
                error,
                raw_response,
            } => json!([{ "error": error, "raw_response": raw_response }]),
        }
    }
}

/// Validate a model reply as exactly `count` idea records.
pub fn validate_ideas(raw: &str, count: usize) -> ProposalOutcome {
    let rejected = |error: String| ProposalOutcome::Rejected {
        error,
        raw_response: raw.to_string(),
    };

    let items = match parse_model_json(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => return rejected("Expected a JSON array of widget ideas".to_string()),
        Err(e) => return rejected(format!("Failed to parse LLM response as JSON: {}", e)),
    };
    if items.len() != count {
        return rejected(format!(
            "LLM did not return exactly {} widget ideas (got {})",
            count,
            items.len()
        ));
    }

    let mut ideas = Vec::with_capacity(count);
    for (idx, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            return rejected(format!("Widget idea {} is not a JSON object", idx));
        };
        ideas.push(WidgetIdea::from_object(object));
    }
    ProposalOutcome::Ideas(ideas)
}

pub async fn propose_ideas(ctx: &StageContext, specification: &Value) -> Result<ProposalOutcome, PipelineError> {
    let count = ctx.config.generation.idea_count;
    info!(count, "Requesting widget ideas");

    let response = ctx
        .provider
        .complete(
            vec![
                ChatMessage::system(prompts::PROPOSAL_ROLE),
                ChatMessage::user(prompts::proposal_prompt(specification, count)),
            ],
            CompletionOptions {
                temperature: Some(0.3),
                max_tokens: Some(20_000),
                ..CompletionOptions::default()
            },
        )
        .await?;

    let outcome = validate_ideas(&response.content, count);
    match &outcome {
        ProposalOutcome::Ideas(ideas) => {
            let coerced = ideas.iter().filter(|idea| idea.was_coerced()).count();
            if coerced > 0 {
                warn!(coerced, "Widget ideas had non-string required fields");
            }
            info!(ideas = ideas.len(), "Widget ideas proposed");
        }
        ProposalOutcome::Rejected { error, .. } => {
            warn!(error = %error, "Widget idea proposal rejected");
        }
    }
    Ok(outcome)
}
