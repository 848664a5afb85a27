//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::PipelineError;

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::Timeout { job_id, .. } => format!(
            "{} (the job keeps its state; check it with `widgetforge jobs show {}`)",
            e, job_id
        ),
        _ => e.to_string(),
    }
}
