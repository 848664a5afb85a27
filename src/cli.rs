//! CLI domain: parse, route, output, and presentation only.
//! No stage logic; single route table dispatches to the pipeline.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, DocsCommands, DocumentKind, JobsCommands, Stage};
pub use presentation::{
    format_config, format_document, format_job_list, format_job_result, format_job_snapshot,
    format_validation_result,
};
pub use route::RunContext;
