//! Integration tests for the orchestration driver and the job submission boundary
//!
//! Tests cover:
//! - Poll budget: exactly `max_attempts` polls, then a timeout
//! - End-to-end idea jobs chaining a specification job
//! - Generation jobs with a supplied specification
//! - Generation jobs reusing the persisted specification
//! - Missing upstream results yielding an empty widget list

use super::test_utils::{
    idea_list, model_specification, stage_context, two_datasource_config, two_datasource_fetcher,
    ScriptedProvider, StubFetcher,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use widgetforge::documents::{DocumentStore, SPECIFICATION_DOCUMENT};
use widgetforge::error::PipelineError;
use widgetforge::jobs::{JobId, JobSnapshot, JobStatus, JobStore};
use widgetforge::pipeline::{JobPoller, JobRequest, OrchestrationDriver, Pipeline};

struct NeverFinishes {
    polls: AtomicU32,
}

#[async_trait]
impl JobPoller for NeverFinishes {
    async fn submit_specification_job(&self) -> Result<JobId, PipelineError> {
        Ok(JobId::from("job-slow"))
    }

    async fn poll(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(JobSnapshot {
            job_id: job_id.clone(),
            kind: "datasource-schemas".to_string(),
            status: JobStatus::Running,
            result: None,
            error: None,
        })
    }
}

/// Routes each model call by the stage its prompt belongs to.
fn stage_provider(ideas: usize) -> ScriptedProvider {
    let spec = model_specification().to_string();
    let ideas = idea_list(ideas).to_string();
    ScriptedProvider::from_fn(move |_, prompt| {
        let reply = if prompt.contains("expert API designer") {
            spec.clone()
        } else if prompt.contains("dashboard widget designer") {
            ideas.clone()
        } else {
            "export default function Widget() { return null; }".to_string()
        };
        (Duration::from_millis(2), Ok(reply))
    })
}

#[tokio::test]
async fn test_driver_polls_exactly_the_budget_then_times_out() {
    let poller = Arc::new(NeverFinishes {
        polls: AtomicU32::new(0),
    });
    let driver = OrchestrationDriver::with_budget(poller.clone(), Duration::from_millis(10), 5);

    let started = Instant::now();
    let err = driver.await_specification().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        err,
        PipelineError::Timeout { attempts: 5, ref job_id } if job_id.as_str() == "job-slow"
    ));
    assert_eq!(poller.polls.load(Ordering::SeqCst), 5);
    // Four sleeps between five polls; none after the last.
    assert!(elapsed >= Duration::from_millis(40));
}

#[tokio::test]
async fn test_widget_ideas_without_spec_runs_end_to_end() {
    let (ctx, _) = stage_context(
        two_datasource_config(),
        Arc::new(stage_provider(2)),
        Arc::new(two_datasource_fetcher()),
    );
    let pipeline = Pipeline::new(ctx, JobStore::temporary().unwrap());
    pipeline.start();

    let job_id = pipeline
        .submit_job(JobRequest::WidgetIdeas { spec: None })
        .unwrap();
    let snapshot = pipeline.wait_for(&job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded, "{:?}", snapshot.error);

    let result = snapshot.result.unwrap();
    assert_eq!(result["schema_description"]["openapi"], "3.1.1");
    assert_eq!(result["response"].as_array().unwrap().len(), 2);

    // The chained specification job is a first-class job too.
    let jobs = pipeline.jobs().list().unwrap();
    assert_eq!(jobs.len(), 2);
    let spec_job = jobs
        .iter()
        .find(|job| job.kind == "datasource-schemas")
        .unwrap();
    assert_eq!(spec_job.status, JobStatus::Succeeded);
    assert_eq!(spec_job.result.as_ref().unwrap()["type"], "openapi");

    pipeline.stop().await;
}

#[tokio::test]
async fn test_end_to_end_with_a_single_worker() {
    let mut config = two_datasource_config();
    config.jobs.workers = 1;
    let (ctx, _) = stage_context(config, Arc::new(stage_provider(2)), Arc::new(two_datasource_fetcher()));
    let pipeline = Pipeline::new(ctx, JobStore::temporary().unwrap());
    pipeline.start();

    let job_id = pipeline
        .submit_job(JobRequest::GenerateWidgets { spec: None })
        .unwrap();
    let snapshot = pipeline.wait_for(&job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded, "{:?}", snapshot.error);
    let widgets = snapshot.result.unwrap();
    assert_eq!(widgets.as_array().unwrap().len(), 2);
    assert!(widgets[0]["code"].as_str().unwrap().contains("Widget"));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_generate_widgets_with_supplied_spec_skips_synthesis() {
    let provider = Arc::new(stage_provider(2));
    let (ctx, _) = stage_context(two_datasource_config(), provider.clone(), Arc::new(StubFetcher::new()));
    let pipeline = Pipeline::new(ctx, JobStore::temporary().unwrap());
    pipeline.start();

    let request = JobRequest::from_stage(
        "generate-widgets",
        Some(&json!({"openapi": "3.1.1", "paths": {}}).to_string()),
    )
    .unwrap();
    let job_id = pipeline.submit_job(request).unwrap();
    let snapshot = pipeline.wait_for(&job_id).await.unwrap();

    let widgets = snapshot.result.unwrap();
    assert_eq!(widgets.as_array().unwrap().len(), 2);
    // One proposal call plus one call per idea.
    assert_eq!(provider.calls(), 3);
    assert!(provider
        .prompts()
        .iter()
        .all(|p| !p.contains("expert API designer")));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_generate_widgets_reuses_persisted_specification() {
    let provider = Arc::new(stage_provider(2));
    let fetcher = Arc::new(StubFetcher::new());
    let (ctx, documents) = stage_context(two_datasource_config(), provider.clone(), fetcher.clone());
    documents
        .write(
            SPECIFICATION_DOCUMENT,
            &json!({"openapi": "3.1.1", "servers": [{"url": "https://pokeapi.co/api/v2/"}], "paths": {}}),
        )
        .unwrap();
    let pipeline = Pipeline::new(ctx, JobStore::temporary().unwrap());
    pipeline.start();

    let job_id = pipeline
        .submit_job(JobRequest::GenerateWidgets { spec: None })
        .unwrap();
    let snapshot = pipeline.wait_for(&job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded, "{:?}", snapshot.error);
    let widgets = snapshot.result.unwrap();
    assert_eq!(widgets.as_array().unwrap().len(), 2);
    assert!(widgets[1]["code"].as_str().unwrap().contains("Widget"));

    // Proposal plus one call per idea; no acquisition, synthesis or chained job.
    assert_eq!(provider.calls(), 3);
    assert!(provider
        .prompts()
        .iter()
        .all(|p| !p.contains("expert API designer")));
    assert!(fetcher.requests().is_empty());
    let jobs = pipeline.jobs().list().unwrap();
    assert_eq!(jobs.len(), 1);
    assert!(jobs.iter().all(|job| job.kind != "datasource-schemas"));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_generate_widgets_without_any_specification_yields_empty_list() {
    let mut config = two_datasource_config();
    config.orchestration.max_poll_attempts = 50;
    let (ctx, _) = stage_context(
        config,
        Arc::new(ScriptedProvider::failing(PipelineError::ProviderAuthFailed(
            "no key".to_string(),
        ))),
        Arc::new(two_datasource_fetcher()),
    );
    let pipeline = Pipeline::new(ctx, JobStore::temporary().unwrap());
    pipeline.start();

    let job_id = pipeline
        .submit_job(JobRequest::GenerateWidgets { spec: None })
        .unwrap();
    let snapshot = pipeline.wait_for(&job_id).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert_eq!(snapshot.result, Some(Value::Array(Vec::new())));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_invalid_spec_is_rejected_before_a_job_exists() {
    let store = JobStore::temporary().unwrap();
    assert!(matches!(
        JobRequest::from_stage("widget-ideas", Some("{\"openapi\": ")),
        Err(PipelineError::InvalidSpecification(_))
    ));
    assert!(store.list().unwrap().is_empty());
}
