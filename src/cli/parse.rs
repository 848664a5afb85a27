//! CLI parse: clap types for widgetforge. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Widgetforge CLI - datasource schemas to generated dashboard widgets
#[derive(Parser)]
#[command(name = "widgetforge")]
#[command(about = "Generate dashboard widgets from live JSON datasources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a stage job, wait for it and print its result
    Run {
        /// Stage to run
        #[arg(value_enum)]
        stage: Stage,
        /// OpenAPI specification JSON to use instead of synthesizing one
        #[arg(long)]
        spec_file: Option<PathBuf>,
    },
    /// Inspect stored jobs
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Inspect persisted documents
    Docs {
        #[command(subcommand)]
        command: DocsCommands,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Schema acquisition and specification synthesis
    DatasourceSchemas,
    /// Widget idea proposal
    WidgetIdeas,
    /// Widget code generation
    GenerateWidgets,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DatasourceSchemas => "datasource-schemas",
            Stage::WidgetIdeas => "widget-ideas",
            Stage::GenerateWidgets => "generate-widgets",
        }
    }
}

#[derive(Subcommand)]
pub enum JobsCommands {
    /// List stored jobs, newest first
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one job
    Show {
        /// Job id
        job_id: String,
    },
}

#[derive(Subcommand)]
pub enum DocsCommands {
    /// Print a persisted document
    Show {
        #[arg(value_enum)]
        document: DocumentKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentKind {
    /// Aggregate schema document for the configured endpoints
    Schema,
    /// Synthesized OpenAPI specification
    Spec,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Validate the effective configuration
    Validate,
}
