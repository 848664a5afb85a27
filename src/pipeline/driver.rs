//! Orchestration driver: chains specification synthesis into idea proposal by
//! submitting the synthesis job and polling it with a bounded budget.

use crate::config::OrchestrationConfig;
use crate::error::PipelineError;
use crate::jobs::{JobId, JobSnapshot, JobStatus};
use crate::pipeline::proposal::{propose_ideas, ProposalOutcome};
use crate::pipeline::StageContext;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const SPECIFICATION_STAGE: &str = "datasource-schemas";

/// Submission and polling of the specification job.
#[async_trait]
pub trait JobPoller: Send + Sync {
    async fn submit_specification_job(&self) -> Result<JobId, PipelineError>;
    async fn poll(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError>;
}

/// `{schema_description, response}` of an end-to-end run.
#[derive(Debug, Clone, PartialEq)]
pub struct EndToEndResult {
    pub specification: Value,
    pub proposal: ProposalOutcome,
}

impl EndToEndResult {
    pub fn to_value(&self) -> Value {
        json!({
            "schema_description": self.specification,
            "response": self.proposal.to_value(),
        })
    }
}

pub struct OrchestrationDriver {
    poller: Arc<dyn JobPoller>,
    interval: Duration,
    max_attempts: u32,
}

impl OrchestrationDriver {
    pub fn new(poller: Arc<dyn JobPoller>, config: &OrchestrationConfig) -> Self {
        Self::with_budget(poller, config.poll_interval(), config.max_poll_attempts)
    }

    pub fn with_budget(poller: Arc<dyn JobPoller>, interval: Duration, max_attempts: u32) -> Self {
        Self {
            poller,
            interval,
            max_attempts,
        }
    }

    /// Submit the specification job and wait for its specification.
    ///
    /// Polls exactly `max_attempts` times, `interval` apart, unless a poll returns a
    /// SUCCEEDED job carrying a specification. Failed polls, FAILED jobs and
    /// malformed-output payloads all count as "not yet" and end in `Timeout`.
    pub async fn await_specification(&self) -> Result<Value, PipelineError> {
        let job_id = self.poller.submit_specification_job().await?;
        info!(job_id = %job_id, max_attempts = self.max_attempts, "Waiting for specification job");

        for attempt in 1..=self.max_attempts {
            match self.poller.poll(&job_id).await {
                Ok(snapshot) => match snapshot.status {
                    JobStatus::Succeeded => match specification_from(&snapshot) {
                        Ok(specification) => return Ok(specification),
                        Err(reason) => {
                            warn!(job_id = %job_id, attempt, reason = %reason, "Specification job succeeded without a specification");
                        }
                    },
                    JobStatus::Failed => {
                        warn!(
                            job_id = %job_id,
                            attempt,
                            error = snapshot.error.as_deref().unwrap_or("job failed"),
                            "Specification job failed"
                        );
                    }
                    JobStatus::Pending | JobStatus::Running => {
                        debug!(job_id = %job_id, attempt, status = %snapshot.status, "Specification job not finished");
                    }
                },
                Err(e) => {
                    warn!(job_id = %job_id, attempt, error = %e, "Polling specification job failed; retrying");
                }
            }
            if attempt < self.max_attempts {
                sleep(self.interval).await;
            }
        }

        Err(PipelineError::Timeout {
            job_id,
            attempts: self.max_attempts,
        })
    }

    /// End-to-end: specification job, then idea proposal in-line.
    pub async fn run(&self, ctx: &StageContext) -> Result<EndToEndResult, PipelineError> {
        let specification = self.await_specification().await?;
        let proposal = propose_ideas(ctx, &specification).await?;
        Ok(EndToEndResult {
            specification,
            proposal,
        })
    }
}

/// The specification in a SUCCEEDED snapshot, or why there is none.
fn specification_from(snapshot: &JobSnapshot) -> Result<Value, String> {
    let result = snapshot.result.as_ref();
    if let Some(schema) = result
        .filter(|r| r.get("type").and_then(Value::as_str) == Some("openapi"))
        .and_then(|r| r.get("schema"))
        .filter(|schema| schema.is_object())
    {
        return Ok(schema.clone());
    }

    Err(match result {
        Some(r) if r.get("error").is_some() => format!(
            "{}; raw response: {}",
            r.get("error").and_then(Value::as_str).unwrap_or("malformed output"),
            r.get("raw_response").and_then(Value::as_str).unwrap_or("")
        ),
        _ => "no specification in job result".to_string(),
    })
}
