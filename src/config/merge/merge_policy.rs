//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("generation.idea_count", 3)?
        .set_default("generation.max_concurrent", 4)?
        .set_default("orchestration.poll_interval_ms", 3_000)?
        .set_default("orchestration.max_poll_attempts", 1_200)?
        .set_default("jobs.workers", 2)?
        .set_default("jobs.max_queue_size", 1_000)?
        .set_default("storage.store_path", ".widgetforge/store")
}
