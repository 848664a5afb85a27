//! Durable sled-backed job store.

use serde_json::Value;
use sled::{Db, Tree};

use crate::error::{PipelineError, StorageError};
use crate::jobs::types::{now_millis, JobId, JobRecord, JobSnapshot, JobStatus};

const TREE_JOBS: &str = "jobs";

pub const INTERRUPTED_ERROR: &str = "interrupted";

#[derive(Clone)]
pub struct JobStore {
    jobs: Tree,
}

impl JobStore {
    pub fn new(db: &Db) -> Result<Self, StorageError> {
        let jobs = db.open_tree(TREE_JOBS)?;
        Ok(Self { jobs })
    }

    /// Store backed by a temporary sled database.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::new(&db)
    }

    /// Create a PENDING job record.
    pub fn create(&self, kind: &str) -> Result<JobRecord, StorageError> {
        let record = JobRecord::new(kind);
        self.put(&record)?;
        Ok(record)
    }

    pub fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StorageError> {
        let Some(raw) = self.jobs.get(job_id.as_str().as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Current snapshot of a job; `JobNotFound` for unknown ids.
    pub fn poll(&self, job_id: &JobId) -> Result<JobSnapshot, PipelineError> {
        self.get(job_id)?
            .map(|record| record.snapshot())
            .ok_or_else(|| PipelineError::JobNotFound(job_id.clone()))
    }

    pub fn mark_running(&self, job_id: &JobId) -> Result<JobRecord, PipelineError> {
        self.transition(job_id, JobStatus::Running, |record| {
            record.started_at_ms = Some(now_millis());
        })
    }

    pub fn mark_succeeded(&self, job_id: &JobId, result: Value) -> Result<JobRecord, PipelineError> {
        self.transition(job_id, JobStatus::Succeeded, move |record| {
            record.result = Some(result.clone());
            record.finished_at_ms = Some(now_millis());
        })
    }

    pub fn mark_failed(&self, job_id: &JobId, error: &str) -> Result<JobRecord, PipelineError> {
        self.transition(job_id, JobStatus::Failed, |record| {
            record.error = Some(error.to_string());
            record.finished_at_ms = Some(now_millis());
        })
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Result<Vec<JobRecord>, StorageError> {
        let mut out = Vec::new();
        for result in self.jobs.iter() {
            let (_, value) = result?;
            let record: JobRecord = serde_json::from_slice(&value)?;
            out.push(record);
        }
        out.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.job_id.as_str().cmp(a.job_id.as_str()))
        });
        Ok(out)
    }

    /// Fail jobs a previous process left PENDING or RUNNING.
    pub fn mark_interrupted(&self) -> Result<usize, StorageError> {
        let mut changed = 0usize;
        for mut record in self.list()? {
            if !record.status.is_terminal() {
                record.status = JobStatus::Failed;
                record.error = Some(INTERRUPTED_ERROR.to_string());
                record.finished_at_ms = Some(now_millis());
                self.put(&record)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn put(&self, record: &JobRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.jobs.insert(record.job_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    // Compare-and-swap keeps each transition atomic per job.
    fn transition<F>(&self, job_id: &JobId, next: JobStatus, apply: F) -> Result<JobRecord, PipelineError>
    where
        F: Fn(&mut JobRecord),
    {
        let key = job_id.as_str().as_bytes();
        loop {
            let current = self
                .jobs
                .get(key)
                .map_err(StorageError::from)?
                .ok_or_else(|| PipelineError::JobNotFound(job_id.clone()))?;
            let mut record: JobRecord =
                serde_json::from_slice(&current).map_err(StorageError::from)?;

            if !record.status.can_transition_to(next) {
                return Err(PipelineError::InvalidTransition {
                    job_id: job_id.clone(),
                    from: record.status,
                    to: next,
                });
            }

            record.status = next;
            apply(&mut record);
            let updated = serde_json::to_vec(&record).map_err(StorageError::from)?;

            let swapped = self
                .jobs
                .compare_and_swap(key, Some(current), Some(updated))
                .map_err(StorageError::from)?;
            if swapped.is_ok() {
                return Ok(record);
            }
        }
    }
}
