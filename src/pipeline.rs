//! Widget pipeline
//!
//! Stages run as background jobs: schema acquisition + specification synthesis, idea
//! proposal, and per-idea code fan-out. [`Pipeline`] is the job submission boundary; it
//! owns the worker queues and hands every stage the same [`StageContext`].

use crate::config::ForgeConfig;
use crate::datasource::{DatasourceFetcher, HttpFetcher};
use crate::documents::{DocumentStore, SledDocumentStore, SPECIFICATION_DOCUMENT};
use crate::error::{PipelineError, StorageError};
use crate::jobs::{JobId, JobQueue, JobSnapshot, JobStore};
use crate::provider::{ModelProviderClient, ProviderFactory};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod acquisition;
pub mod driver;
pub mod fanout;
pub mod proposal;
pub mod prompts;
pub mod synthesis;

pub use acquisition::{acquire_schemas, SchemaDocument, SchemaEntry};
pub use driver::{EndToEndResult, JobPoller, OrchestrationDriver};
pub use fanout::{generate_widgets, GeneratedWidget};
pub use proposal::{propose_ideas, validate_ideas, ProposalOutcome, WidgetIdea};
pub use synthesis::{synthesize_specification, SynthesisOutcome};

/// Shared collaborators handed to every stage.
#[derive(Clone)]
pub struct StageContext {
    pub config: Arc<ForgeConfig>,
    pub provider: Arc<dyn ModelProviderClient>,
    pub fetcher: Arc<dyn DatasourceFetcher>,
    pub documents: Arc<dyn DocumentStore>,
}

#[cfg(test)]
impl StageContext {
    pub(crate) fn for_tests(config: ForgeConfig, provider: Arc<dyn ModelProviderClient>) -> Self {
        struct NoFetch;

        #[async_trait]
        impl DatasourceFetcher for NoFetch {
            async fn get_json(
                &self,
                url: &str,
                _headers: &crate::config::HeaderMap,
            ) -> Result<crate::datasource::FetchResponse, PipelineError> {
                Err(PipelineError::FetchFailed {
                    url: url.to_string(),
                    message: "network disabled".to_string(),
                })
            }
        }

        Self {
            config: Arc::new(config),
            provider,
            fetcher: Arc::new(NoFetch),
            documents: Arc::new(crate::documents::InMemoryDocumentStore::new()),
        }
    }
}

/// Parse a model reply as JSON, tolerating a surrounding Markdown code fence.
pub(crate) fn parse_model_json(raw: &str) -> Result<Value, serde_json::Error> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(|body| {
            // Drop the info string (`json`), which may share the line with the payload.
            let info_len = body
                .find(|c: char| !c.is_ascii_alphanumeric())
                .unwrap_or(body.len());
            if body[..info_len].starts_with(|c: char| c.is_ascii_alphabetic()) {
                &body[info_len..]
            } else {
                body
            }
        })
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim())
}

/// Parse caller-supplied specification text.
pub fn parse_specification(text: &str) -> Result<Value, PipelineError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(PipelineError::InvalidSpecification(
            "specification must be a JSON object".to_string(),
        )),
        Err(e) => Err(PipelineError::InvalidSpecification(format!(
            "Invalid OpenAPI JSON: {}",
            e
        ))),
    }
}

/// A job a client can submit.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    /// Schema acquisition followed by specification synthesis
    DatasourceSchemas,
    /// Idea proposal; without a specification, runs end-to-end first
    WidgetIdeas { spec: Option<Value> },
    /// Per-idea code generation
    GenerateWidgets { spec: Option<Value> },
}

impl JobRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            JobRequest::DatasourceSchemas => "datasource-schemas",
            JobRequest::WidgetIdeas { .. } => "widget-ideas",
            JobRequest::GenerateWidgets { .. } => "generate-widgets",
        }
    }

    /// Build a request from a stage name and optional specification text.
    pub fn from_stage(stage: &str, spec_text: Option<&str>) -> Result<Self, PipelineError> {
        let spec = spec_text.map(parse_specification).transpose()?;
        match stage {
            "datasource-schemas" => Ok(JobRequest::DatasourceSchemas),
            "widget-ideas" => Ok(JobRequest::WidgetIdeas { spec }),
            "generate-widgets" => Ok(JobRequest::GenerateWidgets { spec }),
            other => Err(PipelineError::ConfigError(format!("Unknown stage: {}", other))),
        }
    }
}

/// Schema acquisition + synthesis as a job result payload.
pub async fn run_specification_stage(ctx: &StageContext) -> Result<Value, PipelineError> {
    let schemas = acquire_schemas(ctx).await?;
    let outcome = synthesize_specification(ctx, &schemas).await?;
    Ok(outcome.to_job_result())
}

/// Resolve a specification and ideas, then fan out code generation.
///
/// A missing specification or idea list yields an empty result rather than an error.
pub async fn run_generation_stage(
    ctx: &StageContext,
    driver: &OrchestrationDriver,
    spec: Option<Value>,
) -> Result<Vec<GeneratedWidget>, PipelineError> {
    let (specification, proposal) = match spec {
        Some(spec) => {
            let proposal = propose_ideas(ctx, &spec).await?;
            (spec, proposal)
        }
        None => match ctx.documents.read(SPECIFICATION_DOCUMENT)? {
            Some(stored) => {
                info!(document = SPECIFICATION_DOCUMENT, "Using persisted specification");
                let proposal = propose_ideas(ctx, &stored).await?;
                (stored, proposal)
            }
            None => match driver.run(ctx).await {
                Ok(result) => (result.specification, result.proposal),
                Err(e) => {
                    warn!(error = %e, "No specification available; generating nothing");
                    return Ok(Vec::new());
                }
            },
        },
    };

    match proposal.ideas() {
        Some(ideas) if !ideas.is_empty() => generate_widgets(ctx, &specification, ideas).await,
        _ => {
            warn!("No widget ideas available; generating nothing");
            Ok(Vec::new())
        }
    }
}

/// Submits specification jobs to the chained-stage queue.
struct ChainedPoller {
    ctx: StageContext,
    queue: Arc<JobQueue>,
}

#[async_trait]
impl JobPoller for ChainedPoller {
    async fn submit_specification_job(&self) -> Result<JobId, PipelineError> {
        let ctx = self.ctx.clone();
        self.queue
            .submit(driver::SPECIFICATION_STAGE, async move {
                run_specification_stage(&ctx).await
            })
    }

    async fn poll(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError> {
        self.queue.poll(job_id)
    }
}

/// Job submission boundary.
pub struct Pipeline {
    ctx: StageContext,
    /// Client-submitted jobs
    queue: Arc<JobQueue>,
    /// Jobs submitted by a running stage; kept apart so a waiting parent never
    /// occupies the worker its child needs
    chained: Arc<JobQueue>,
    store: JobStore,
}

impl Pipeline {
    pub fn new(ctx: StageContext, store: JobStore) -> Self {
        let jobs = ctx.config.jobs.clone();
        Self {
            queue: Arc::new(JobQueue::new(store.clone(), jobs.clone())),
            chained: Arc::new(JobQueue::new(store.clone(), jobs)),
            ctx,
            store,
        }
    }

    /// Open the workspace store and build production collaborators.
    ///
    /// Jobs left unfinished by a previous process are marked FAILED.
    pub fn open(config: Arc<ForgeConfig>, workspace_root: &Path) -> Result<Self, PipelineError> {
        let store_path = config.storage.resolve_store_path(workspace_root);
        let db = sled::open(&store_path).map_err(|e| {
            StorageError::OpenFailed(format!("{}: {}", store_path.display(), e))
        })?;
        let store = JobStore::new(&db)?;
        let interrupted = store.mark_interrupted()?;
        if interrupted > 0 {
            warn!(interrupted, "Marked jobs from a previous run as interrupted");
        }

        let ctx = StageContext {
            provider: ProviderFactory::create_client(&config.provider)?,
            fetcher: Arc::new(HttpFetcher::new()?),
            documents: Arc::new(SledDocumentStore::new(&db)?),
            config,
        };
        Ok(Self::new(ctx, store))
    }

    pub fn start(&self) {
        self.queue.start();
        self.chained.start();
    }

    pub async fn stop(&self) {
        self.queue.stop().await;
        self.chained.stop().await;
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub fn jobs(&self) -> &JobStore {
        &self.store
    }

    pub fn driver(&self) -> OrchestrationDriver {
        OrchestrationDriver::new(
            Arc::new(ChainedPoller {
                ctx: self.ctx.clone(),
                queue: Arc::clone(&self.chained),
            }),
            &self.ctx.config.orchestration,
        )
    }

    /// Enqueue a job and return its id without waiting.
    pub fn submit_job(&self, request: JobRequest) -> Result<JobId, PipelineError> {
        let kind = request.kind();
        let ctx = self.ctx.clone();
        match request {
            JobRequest::DatasourceSchemas => self
                .queue
                .submit(kind, async move { run_specification_stage(&ctx).await }),
            JobRequest::WidgetIdeas { spec: Some(spec) } => self.queue.submit(kind, async move {
                Ok(propose_ideas(&ctx, &spec).await?.to_value())
            }),
            JobRequest::WidgetIdeas { spec: None } => {
                let driver = self.driver();
                self.queue
                    .submit(kind, async move { Ok(driver.run(&ctx).await?.to_value()) })
            }
            JobRequest::GenerateWidgets { spec } => {
                let driver = self.driver();
                self.queue.submit(kind, async move {
                    let widgets = run_generation_stage(&ctx, &driver, spec).await?;
                    serde_json::to_value(widgets).map_err(|e| {
                        PipelineError::stage_failed("generate-widgets", e.to_string())
                    })
                })
            }
        }
    }

    pub fn get_job(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError> {
        self.store.poll(job_id)
    }

    /// Wait for a job using the orchestration poll budget.
    pub async fn wait_for(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError> {
        let orchestration = &self.ctx.config.orchestration;
        self.queue
            .wait_for(
                job_id,
                orchestration.poll_interval(),
                orchestration.max_poll_attempts,
            )
            .await
    }
}
