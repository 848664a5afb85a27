//! Background jobs: durable job records and the worker queue that executes them.
//!
//! A job is created PENDING at submission, moved to RUNNING by exactly one worker, and
//! finishes SUCCEEDED (with a result) or FAILED (with an error). Callers observe progress
//! only by polling the [`JobStore`].

mod queue;
mod store;
mod types;

pub(crate) use queue::panic_message;
pub use queue::{JobQueue, JobWork, QueueStats};
pub use store::JobStore;
pub use types::{now_millis, JobId, JobRecord, JobSnapshot, JobStatus};
