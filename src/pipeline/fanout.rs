//! Code fan-out: one concurrent generation call per idea, collected in input order.

use crate::error::PipelineError;
use crate::jobs::panic_message;
use crate::pipeline::proposal::WidgetIdea;
use crate::pipeline::{prompts, StageContext};
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use futures::stream::{self, StreamExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedWidget {
    pub widget_title: String,
    pub widget_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Set when this idea's generation failed; siblings are unaffected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedWidget {
    fn generated(idea: &WidgetIdea, code: String) -> Self {
        Self {
            widget_title: idea.widget_title.clone(),
            widget_description: idea.widget_description.clone(),
            code: Some(code),
            error: None,
        }
    }

    fn failed(idea: &WidgetIdea, error: String) -> Self {
        Self {
            widget_title: idea.widget_title.clone(),
            widget_description: idea.widget_description.clone(),
            code: None,
            error: Some(error),
        }
    }
}

fn generation_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(0.2),
        max_tokens: Some(20_000),
        ..CompletionOptions::default()
    }
}

/// Generation template: the configured override file, or the built-in template.
pub fn load_template(ctx: &StageContext) -> Result<String, PipelineError> {
    match &ctx.config.generation.template_path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!(
                "Failed to read widget template {}: {}",
                path.display(),
                e
            ))
        }),
        None => Ok(prompts::DEFAULT_WIDGET_TEMPLATE.to_string()),
    }
}

/// Generate code for every idea on a pool of `generation.max_concurrent` calls.
///
/// Output order equals input order. A model error or panic marks only its own slot.
pub async fn generate_widgets(
    ctx: &StageContext,
    specification: &Value,
    ideas: &[WidgetIdea],
) -> Result<Vec<GeneratedWidget>, PipelineError> {
    let template = load_template(ctx)?;
    let spec_text =
        serde_json::to_string_pretty(specification).unwrap_or_else(|_| specification.to_string());
    let max_concurrent = ctx.config.generation.max_concurrent.max(1);
    info!(ideas = ideas.len(), max_concurrent, "Generating widget code");

    // Each unit owns its inputs, so the buffered stream holds no borrow of `ctx`.
    let units: Vec<BoxFuture<'static, GeneratedWidget>> = ideas.iter().enumerate().map(|(index, idea)| {
        let auth = prompts::auth_context(ctx.config.datasources.match_auth_context(&idea.endpoint));
        let prompt = prompts::widget_prompt(&template, &idea.widget_description, &spec_text, &auth);
        let provider = Arc::clone(&ctx.provider);
        let idea = idea.clone();
        async move {
            let outcome = AssertUnwindSafe(generate_one(provider, prompt))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(code)) => {
                    debug!(index, title = %idea.widget_title, bytes = code.len(), "Widget generated");
                    GeneratedWidget::generated(&idea, code)
                }
                Ok(Err(e)) => {
                    warn!(index, title = %idea.widget_title, error = %e, "Widget generation failed");
                    GeneratedWidget::failed(&idea, e.to_string())
                }
                Err(panic) => {
                    let message = format!("generation panicked: {}", panic_message(panic.as_ref()));
                    warn!(index, title = %idea.widget_title, error = %message, "Widget generation panicked");
                    GeneratedWidget::failed(&idea, message)
                }
            }
        }
        .boxed()
    })
    .collect();

    let widgets: Vec<GeneratedWidget> = stream::iter(units).buffered(max_concurrent).collect().await;
    let failed = widgets.iter().filter(|w| w.error.is_some()).count();
    info!(widgets = widgets.len(), failed, "Widget generation finished");
    Ok(widgets)
}

async fn generate_one(provider: Arc<dyn ModelProviderClient>, prompt: String) -> Result<String, PipelineError> {
    let response = provider
        .complete(vec![ChatMessage::user(prompt)], generation_options())
        .await?;
    Ok(response.content)
}
