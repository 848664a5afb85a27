//! CLI route: single route table and run context. Dispatches to the pipeline and presentation.

use crate::cli::parse::{Commands, ConfigCommands, DocsCommands, DocumentKind, JobsCommands};
use crate::cli::presentation::{
    format_config, format_document, format_job_list, format_job_result, format_job_snapshot,
    format_validation_result,
};
use crate::config::{ConfigLoader, ForgeConfig};
use crate::documents::{
    schema_document_name, DocumentStore, SledDocumentStore, SPECIFICATION_DOCUMENT,
};
use crate::error::{PipelineError, StorageError};
use crate::jobs::{JobId, JobSnapshot, JobStatus, JobStore};
use crate::pipeline::{JobRequest, Pipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace root and the effective configuration.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    config: Arc<ForgeConfig>,
    workspace_root: PathBuf,
}

impl RunContext {
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            config: Arc::new(config),
            workspace_root,
        })
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Run { stage, spec_file } => {
                self.handle_run(stage.as_str(), spec_file.as_deref()).await
            }
            Commands::Jobs { command } => self.handle_jobs(command),
            Commands::Docs { command } => self.handle_docs(command),
            Commands::Config { command } => self.handle_config(command),
        }
    }

    async fn handle_run(&self, stage: &str, spec_file: Option<&Path>) -> Result<String, PipelineError> {
        let spec_text = spec_file
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::ConfigError(format!(
                        "Failed to read specification {}: {}",
                        path.display(),
                        e
                    ))
                })
            })
            .transpose()?;
        // Rejected before a job exists.
        let request = JobRequest::from_stage(stage, spec_text.as_deref())?;

        let pipeline = Pipeline::open(Arc::clone(&self.config), &self.workspace_root)?;
        pipeline.start();

        let started = Instant::now();
        let outcome = match pipeline.submit_job(request) {
            Ok(job_id) => {
                info!(job_id = %job_id, stage, "Job submitted");
                pipeline.wait_for(&job_id).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            // The worker still holds the job; exiting leaves it for the next run to mark interrupted.
            Err(e @ PipelineError::Timeout { .. }) => {
                warn!(stage, error = %e, "Job did not finish within the poll budget");
                Err(e)
            }
            other => {
                pipeline.stop().await;
                let snapshot = other?;
                info!(
                    job_id = %snapshot.job_id,
                    status = %snapshot.status,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job finished"
                );
                render_finished(snapshot)
            }
        }
    }

    fn handle_jobs(&self, command: &JobsCommands) -> Result<String, PipelineError> {
        let store = JobStore::new(&self.open_db()?)?;
        match command {
            JobsCommands::List { format } => format_job_list(&store.list()?, format),
            JobsCommands::Show { job_id } => {
                format_job_snapshot(&store.poll(&JobId::from(job_id.as_str()))?)
            }
        }
    }

    fn handle_docs(&self, command: &DocsCommands) -> Result<String, PipelineError> {
        let DocsCommands::Show { document } = command;
        let name = match document {
            DocumentKind::Schema => schema_document_name(&self.config.datasources.endpoints),
            DocumentKind::Spec => SPECIFICATION_DOCUMENT.to_string(),
        };
        let documents = SledDocumentStore::new(&self.open_db()?)?;
        format_document(&name, documents.read(&name)?.as_ref())
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, PipelineError> {
        match command {
            ConfigCommands::Show => format_config(&self.config),
            ConfigCommands::Validate => {
                let result = self.config.validate();
                let text = format_validation_result(&result);
                match result {
                    Ok(()) => Ok(text),
                    Err(_) => Err(PipelineError::ConfigError(text)),
                }
            }
        }
    }

    fn open_db(&self) -> Result<sled::Db, PipelineError> {
        let path = self.config.storage.resolve_store_path(&self.workspace_root);
        sled::open(&path)
            .map_err(|e| StorageError::OpenFailed(format!("{}: {}", path.display(), e)).into())
    }
}

fn render_finished(snapshot: JobSnapshot) -> Result<String, PipelineError> {
    match snapshot.status {
        JobStatus::Failed => Err(PipelineError::stage_failed(
            &snapshot.kind,
            snapshot.error.unwrap_or_else(|| "job failed".to_string()),
        )),
        _ => format_job_result(snapshot.result.as_ref()),
    }
}
