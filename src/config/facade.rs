//! Configuration loading facade over the `config` crate.

use crate::config::merge::merge_policy;
use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::ForgeConfig;
use crate::error::PipelineError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

/// Loads `ForgeConfig` from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace files,
    /// `WIDGETFORGE__SECTION__KEY` variables, legacy datasource variables.
    pub fn load(workspace_root: &Path) -> Result<ForgeConfig, PipelineError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        Self::finish(builder)
    }

    /// Load configuration from one explicit file (plus environment overrides).
    pub fn load_from_file(path: &Path) -> Result<ForgeConfig, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::ConfigError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ForgeConfig, PipelineError> {
        let settings = builder
            .add_source(
                Environment::with_prefix("WIDGETFORGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let mut config: ForgeConfig = settings.try_deserialize()?;
        environment::apply_overrides(&mut config);
        debug!(
            endpoints = config.datasources.endpoints.len(),
            idea_count = config.generation.idea_count,
            "Configuration loaded"
        );
        Ok(config)
    }
}
