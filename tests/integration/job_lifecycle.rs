//! Integration tests for the job store and worker queue
//!
//! Tests cover:
//! - PENDING -> RUNNING -> terminal transitions observed by polling
//! - Failure capture (errors and panics)
//! - Illegal transitions
//! - Unknown job ids
//! - Restart recovery of unfinished jobs

use serde_json::json;
use std::time::Duration;
use widgetforge::config::JobsConfig;
use widgetforge::error::PipelineError;
use widgetforge::jobs::{JobId, JobQueue, JobStatus, JobStore};

fn queue(workers: usize) -> JobQueue {
    let store = JobStore::temporary().unwrap();
    JobQueue::new(
        store,
        JobsConfig {
            workers,
            max_queue_size: 16,
        },
    )
}

#[tokio::test]
async fn test_submitted_job_is_pending_until_a_worker_runs_it() {
    let queue = queue(1);
    queue.start();

    let gate = std::sync::Arc::new(tokio::sync::Notify::new());
    let blocker = gate.clone();
    let first = queue
        .submit("blocking", async move {
            blocker.notified().await;
            Ok(json!("first"))
        })
        .unwrap();
    let second = queue.submit("waiting", async { Ok(json!("second")) }).unwrap();

    // The single worker is held by `first`, so `second` stays queued.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.poll(&first).unwrap().status, JobStatus::Running);
    assert_eq!(queue.poll(&second).unwrap().status, JobStatus::Pending);

    gate.notify_one();
    let done = queue
        .wait_for(&second, Duration::from_millis(10), 200)
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.result, Some(json!("second")));
    assert_eq!(queue.poll(&first).unwrap().result, Some(json!("first")));

    // Terminal state is stable across polls.
    assert_eq!(queue.poll(&second).unwrap(), done);
    assert_eq!(queue.poll(&second).unwrap(), done);

    queue.stop().await;
}

#[tokio::test]
async fn test_failures_are_recorded_on_the_job() {
    let queue = queue(2);
    queue.start();

    let failing = queue
        .submit("failing", async {
            Err(PipelineError::ProviderAuthFailed("bad key".to_string()))
        })
        .unwrap();
    let panicking = queue
        .submit("panicking", async {
            if true {
                panic!("worker blew up");
            }
            Ok(json!(null))
        })
        .unwrap();

    let failed = queue
        .wait_for(&failing, Duration::from_millis(10), 200)
        .await
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.result.is_none());
    assert!(failed.error.unwrap().contains("bad key"));

    let panicked = queue
        .wait_for(&panicking, Duration::from_millis(10), 200)
        .await
        .unwrap();
    assert_eq!(panicked.status, JobStatus::Failed);
    assert!(panicked.error.unwrap().contains("worker blew up"));

    // The queue keeps serving after a panic.
    let after = queue.submit("after", async { Ok(json!(1)) }).unwrap();
    let after = queue
        .wait_for(&after, Duration::from_millis(10), 200)
        .await
        .unwrap();
    assert_eq!(after.status, JobStatus::Succeeded);

    queue.stop().await;
}

#[test]
fn test_terminal_jobs_never_move_again() {
    let store = JobStore::temporary().unwrap();
    let record = store.create("widget-ideas").unwrap();
    store.mark_running(&record.job_id).unwrap();
    store.mark_succeeded(&record.job_id, json!([])).unwrap();

    let err = store.mark_failed(&record.job_id, "late failure").unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidTransition {
            from: JobStatus::Succeeded,
            to: JobStatus::Failed,
            ..
        }
    ));
    assert!(store.mark_running(&record.job_id).is_err());

    let snapshot = store.poll(&record.job_id).unwrap();
    assert_eq!(snapshot.status, JobStatus::Succeeded);
    assert!(snapshot.error.is_none());
}

#[test]
fn test_unknown_job_id_is_not_found() {
    let store = JobStore::temporary().unwrap();
    assert!(matches!(
        store.poll(&JobId::from("job-0-0-0")),
        Err(PipelineError::JobNotFound(_))
    ));
}

#[test]
fn test_unfinished_jobs_are_interrupted_on_reopen() {
    let db = sled::Config::new().temporary(true).open().unwrap();

    let (pending, running, done) = {
        let store = JobStore::new(&db).unwrap();
        let pending = store.create("datasource-schemas").unwrap().job_id;
        let running = store.create("widget-ideas").unwrap().job_id;
        store.mark_running(&running).unwrap();
        let done = store.create("generate-widgets").unwrap().job_id;
        store.mark_running(&done).unwrap();
        store.mark_succeeded(&done, json!([])).unwrap();
        (pending, running, done)
    };

    let reopened = JobStore::new(&db).unwrap();
    assert_eq!(reopened.mark_interrupted().unwrap(), 2);
    for id in [&pending, &running] {
        let snapshot = reopened.poll(id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("interrupted"));
    }
    assert_eq!(reopened.poll(&done).unwrap().status, JobStatus::Succeeded);
    assert_eq!(reopened.list().unwrap().len(), 3);
}

#[test]
fn test_job_ids_are_unique() {
    let store = JobStore::temporary().unwrap();
    let mut ids = std::collections::HashSet::new();
    for _ in 0..200 {
        assert!(ids.insert(store.create("widget-ideas").unwrap().job_id));
    }
}
