//! Subcommand implementations.

pub mod archive;
pub mod render;
pub mod run;

use std::path::Path;

use lidarmap::config::PipelineConfig;
use lidarmap::logging::{self, LoggingGuard};

use crate::error::CliError;

/// Load the configuration file and install logging from it.
pub fn load_config(path: &Path) -> Result<(PipelineConfig, LoggingGuard), CliError> {
    let config = PipelineConfig::load(path)?;
    let guard = logging::init(&config.logging)?;
    tracing::info!(
        version = lidarmap::VERSION,
        config = %path.display(),
        "lidarmap starting"
    );
    Ok((config, guard))
}
