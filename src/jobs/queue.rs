//! Job Queue
//!
//! FIFO queue of submitted units of work drained by a fixed pool of tokio workers.
//! Each unit runs exactly once; its outcome (value, error, or panic) is recorded in the
//! [`JobStore`] so the job never stays PENDING or RUNNING after its worker finishes.

use crate::config::JobsConfig;
use crate::error::PipelineError;
use crate::jobs::store::JobStore;
use crate::jobs::types::{JobId, JobSnapshot};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// A unit of work producing the job's result payload.
pub type JobWork = BoxFuture<'static, Result<Value, PipelineError>>;

struct QueuedJob {
    job_id: JobId,
    kind: String,
    work: JobWork,
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of submitted jobs not yet picked up
    pub pending: usize,
    /// Number of jobs currently executing
    pub processing: usize,
    /// Number of jobs that finished SUCCEEDED
    pub completed: usize,
    /// Number of jobs that finished FAILED
    pub failed: usize,
}

pub struct JobQueue {
    /// Submitted units awaiting a worker
    queue: Arc<Mutex<VecDeque<QueuedJob>>>,
    /// Notifier to wake workers when new items are enqueued
    notify: Arc<Notify>,
    workers: Arc<RwLock<Vec<tokio::task::JoinHandle<()>>>>,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<QueueStats>>,
    store: JobStore,
    config: JobsConfig,
}

const IDLE_RECHECK: Duration = Duration::from_millis(100);

impl JobQueue {
    pub fn new(store: JobStore, config: JobsConfig) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            workers: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(QueueStats::default())),
            store,
            config,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Record a PENDING job and enqueue its work. Returns without waiting for execution.
    pub fn submit<F>(&self, kind: &str, work: F) -> Result<JobId, PipelineError>
    where
        F: Future<Output = Result<Value, PipelineError>> + Send + 'static,
    {
        if !*self.running.read() {
            return Err(PipelineError::QueueStopped);
        }

        let mut queue = self.queue.lock();
        if queue.len() >= self.config.max_queue_size {
            warn!(kind, pending = queue.len(), "Job queue full; rejecting submission");
            return Err(PipelineError::QueueFull(queue.len()));
        }

        let record = self.store.create(kind)?;
        queue.push_back(QueuedJob {
            job_id: record.job_id.clone(),
            kind: kind.to_string(),
            work: work.boxed(),
        });
        drop(queue);

        self.stats.write().pending += 1;
        self.notify.notify_one();

        info!(job_id = %record.job_id, kind, "Job submitted");
        Ok(record.job_id)
    }

    pub fn poll(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError> {
        self.store.poll(job_id)
    }

    /// Start background workers
    pub fn start(&self) {
        let mut running = self.running.write();
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let mut workers = self.workers.write();
        for worker_id in 0..self.config.workers.max(1) {
            let queue = Arc::clone(&self.queue);
            let notify = Arc::clone(&self.notify);
            let running = Arc::clone(&self.running);
            let stats = Arc::clone(&self.stats);
            let store = self.store.clone();

            workers.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, queue, notify, running, stats, store).await;
            }));
        }

        info!(worker_count = workers.len(), "Started job queue workers");
    }

    /// Stop workers after their current job. Queued jobs stay PENDING.
    pub async fn stop(&self) {
        {
            let mut running = self.running.write();
            if !*running {
                return;
            }
            *running = false;
        }
        self.notify.notify_waiters();

        let workers = std::mem::take(&mut *self.workers.write());
        for handle in workers {
            let _ = handle.await;
        }
        info!("Stopped job queue workers");
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.read().clone()
    }

    /// Poll until the job is terminal, at most `max_attempts` times.
    pub async fn wait_for(
        &self,
        job_id: &JobId,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<JobSnapshot, PipelineError> {
        for attempt in 1..=max_attempts {
            let snapshot = self.store.poll(job_id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            if attempt < max_attempts {
                sleep(interval).await;
            }
        }
        Err(PipelineError::Timeout {
            job_id: job_id.clone(),
            attempts: max_attempts,
        })
    }

    async fn worker_loop(
        worker_id: usize,
        queue: Arc<Mutex<VecDeque<QueuedJob>>>,
        notify: Arc<Notify>,
        running: Arc<RwLock<bool>>,
        stats: Arc<RwLock<QueueStats>>,
        store: JobStore,
    ) {
        debug!(worker_id, "Worker started");

        while *running.read() {
            let next = queue.lock().pop_front();
            let Some(job) = next else {
                tokio::select! {
                    _ = notify.notified() => continue,
                    _ = sleep(IDLE_RECHECK) => continue,
                }
            };

            {
                let mut stats = stats.write();
                stats.pending = stats.pending.saturating_sub(1);
                stats.processing += 1;
            }

            let succeeded = Self::execute(worker_id, job, &store).await;

            let mut stats = stats.write();
            stats.processing = stats.processing.saturating_sub(1);
            if succeeded {
                stats.completed += 1;
            } else {
                stats.failed += 1;
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    async fn execute(worker_id: usize, job: QueuedJob, store: &JobStore) -> bool {
        let QueuedJob { job_id, kind, work } = job;

        if let Err(e) = store.mark_running(&job_id) {
            error!(worker_id, job_id = %job_id, error = %e, "Could not mark job running; skipping");
            return false;
        }
        debug!(worker_id, job_id = %job_id, kind = %kind, "Job running");

        let outcome = AssertUnwindSafe(work).catch_unwind().await;
        let recorded = match outcome {
            Ok(Ok(value)) => store.mark_succeeded(&job_id, value).map(|_| true),
            Ok(Err(err)) => {
                error!(worker_id, job_id = %job_id, kind = %kind, error = %err, "Job failed");
                store.mark_failed(&job_id, &err.to_string()).map(|_| false)
            }
            Err(panic) => {
                let message = format!("job panicked: {}", panic_message(panic.as_ref()));
                error!(worker_id, job_id = %job_id, kind = %kind, error = %message, "Job panicked");
                store.mark_failed(&job_id, &message).map(|_| false)
            }
        };

        match recorded {
            Ok(succeeded) => {
                info!(job_id = %job_id, kind = %kind, succeeded, "Job finished");
                succeeded
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to record job outcome");
                false
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
