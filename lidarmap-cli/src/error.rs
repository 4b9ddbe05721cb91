//! CLI error type.

use std::fmt;

use lidarmap::archive::ArchiveError;
use lidarmap::config::ConfigError;
use lidarmap::logging::LoggingError;
use lidarmap::pipeline::PipelineError;
use lidarmap::pointcloud::DecodeError;
use lidarmap::tile::manifest::ManifestError;

/// Errors reported to the user before exiting with a non-zero status.
#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Manifest(ManifestError),
    Pipeline(PipelineError),
    Decode(DecodeError),
    Archive(ArchiveError),
    /// Every requested raster failed.
    Render(String),
    SignalHandler(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(e) => write!(f, "Logging setup failed: {}", e),
            CliError::Manifest(e) => write!(f, "Manifest error: {}", e),
            CliError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            CliError::Decode(e) => write!(f, "Could not read point cloud: {}", e),
            CliError::Archive(e) => write!(f, "Archive error: {}", e),
            CliError::Render(msg) => write!(f, "Rendering failed: {}", msg),
            CliError::SignalHandler(msg) => write!(f, "Failed to set signal handler: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<ManifestError> for CliError {
    fn from(e: ManifestError) -> Self {
        CliError::Manifest(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}

impl From<DecodeError> for CliError {
    fn from(e: DecodeError) -> Self {
        CliError::Decode(e)
    }
}

impl From<ArchiveError> for CliError {
    fn from(e: ArchiveError) -> Self {
        CliError::Archive(e)
    }
}
