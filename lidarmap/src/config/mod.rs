//! Pipeline configuration.
//!
//! Configuration is read once at startup from an INI file (see [`file`]) and
//! is read-only afterwards. Every component receives the part it needs by
//! reference or by clone; nothing mutates it after [`PipelineConfig::load`].
//!
//! ```ini
//! [processing]
//! las_path = data/las
//! laz_path = data/laz
//! compress_to_laz = true
//! processing_processes = 4
//! download_processes = 2
//!
//! [output.buildings]
//! type = binary
//! path = output/buildings
//! point_class = 6
//! ```

mod file;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use output::{ColorMap, GeneratorConfig, GeneratorKind, GeneratorParams, Rgb};

/// Tile list published by the Latvian Geospatial Information Agency.
pub const DEFAULT_MANIFEST_URL: &str =
    "https://s3.storage.pub.lvdc.gov.lv/lgia-opendata/las/LGIA_OpenData_las_saites.txt";

/// URL segment after which the relative tile path begins.
pub const DEFAULT_PATH_MARKER: &str = "/las/";

/// LKS-92 / Latvia TM.
pub const DEFAULT_EPSG: u16 = 3059;

/// Default bound for each backlog.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default number of fetches allowed per URL during one run.
pub const DEFAULT_MAX_DOWNLOAD_ATTEMPTS: u32 = 3;

/// Default HTTP timeout for tile downloads in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or parsed.
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// Inline configuration text is not valid INI.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ini::ParseError),

    /// A required key is absent.
    #[error("missing key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    /// A key is present but its value cannot be used.
    #[error("invalid value '{value}' for '{key}' in section [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// An output section names an unsupported generator type.
    #[error("unknown output type '{value}' in section [{section}]")]
    UnknownOutputType { section: String, value: String },
}

/// Where the tile list comes from and how its URLs map to local paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestConfig {
    /// URL of the newline-delimited tile list.
    pub url: String,

    /// URL segment after which the relative tile path begins.
    pub path_marker: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MANIFEST_URL.to_string(),
            path_marker: DEFAULT_PATH_MARKER.to_string(),
        }
    }
}

/// Settings for storage, archival and both worker pools.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    /// Root directory for raw LAS tiles.
    pub las_path: PathBuf,

    /// Root directory for LAZ archives.
    pub laz_path: PathBuf,

    /// Archive each raw tile after its rasters are produced.
    pub compress_to_laz: bool,

    /// Remove the raw tile once it has been archived (or archival is off).
    pub delete_las_after_processing: bool,

    /// Number of processing workers.
    pub processing_workers: usize,

    /// Number of download workers.
    pub download_workers: usize,

    /// Capacity of each backlog. Producers block when it is reached.
    pub queue_capacity: usize,

    /// Fetches allowed per URL during one run, including recovery fetches.
    pub max_download_attempts: u32,

    /// Delay added per previous attempt before a retried fetch.
    pub retry_backoff: Duration,

    /// HTTP timeout for a single tile download.
    pub download_timeout: Duration,

    /// EPSG code written into every raster.
    pub epsg: u16,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            las_path: PathBuf::from("data/las"),
            laz_path: PathBuf::from("data/laz"),
            compress_to_laz: true,
            delete_las_after_processing: true,
            processing_workers: 4,
            download_workers: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_download_attempts: DEFAULT_MAX_DOWNLOAD_ATTEMPTS,
            retry_backoff: Duration::from_secs(5),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            epsg: DEFAULT_EPSG,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Optional file receiving a copy of every log line.
    pub file: Option<PathBuf>,

    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
        }
    }
}

/// Complete configuration for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub manifest: ManifestConfig,
    pub processing: ProcessingConfig,
    pub outputs: Vec<GeneratorConfig>,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Create a configuration with default settings rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            processing: ProcessingConfig {
                las_path: data_dir.join("las"),
                laz_path: data_dir.join("laz"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Add an output rule.
    pub fn with_output(mut self, output: GeneratorConfig) -> Self {
        self.outputs.push(output);
        self
    }

    /// Set the number of processing and download workers.
    pub fn with_workers(mut self, processing: usize, download: usize) -> Self {
        self.processing.processing_workers = processing.max(1);
        self.processing.download_workers = download.max(1);
        self
    }

    /// Enable or disable LAZ archival.
    pub fn with_archival(mut self, enabled: bool) -> Self {
        self.processing.compress_to_laz = enabled;
        self
    }

    /// Enable or disable raw tile removal after processing.
    pub fn with_cleanup(mut self, enabled: bool) -> Self {
        self.processing.delete_las_after_processing = enabled;
        self
    }

    /// Set the per-URL fetch limit.
    pub fn with_max_download_attempts(mut self, attempts: u32) -> Self {
        self.processing.max_download_attempts = attempts.max(1);
        self
    }

    /// Set the delay added per previous attempt before a retried fetch.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.processing.retry_backoff = backoff;
        self
    }

    /// Set the backlog capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.processing.queue_capacity = capacity.max(1);
        self
    }

    /// Output rules that are switched on.
    pub fn enabled_outputs(&self) -> impl Iterator<Item = &GeneratorConfig> {
        self.outputs.iter().filter(|o| o.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_processing_config() {
        let config = ProcessingConfig::default();
        assert!(config.compress_to_laz);
        assert!(config.delete_las_after_processing);
        assert_eq!(config.epsg, 3059);
        assert_eq!(config.max_download_attempts, DEFAULT_MAX_DOWNLOAD_ATTEMPTS);
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::new("/srv/lidar")
            .with_workers(0, 3)
            .with_archival(false)
            .with_cleanup(false)
            .with_queue_capacity(8);

        assert_eq!(config.processing.las_path, PathBuf::from("/srv/lidar/las"));
        assert_eq!(config.processing.laz_path, PathBuf::from("/srv/lidar/laz"));
        assert_eq!(config.processing.processing_workers, 1);
        assert_eq!(config.processing.download_workers, 3);
        assert!(!config.processing.compress_to_laz);
        assert_eq!(config.processing.queue_capacity, 8);
    }

    #[test]
    fn test_enabled_outputs_skips_disabled() {
        let config = PipelineConfig::new("/tmp")
            .with_output(GeneratorConfig::binary("buildings", "/out/b", 6))
            .with_output(GeneratorConfig::binary("water", "/out/w", 9).disabled());

        let names: Vec<_> = config.enabled_outputs().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["buildings"]);
    }

    #[test]
    fn test_missing_key_display() {
        let err = ConfigError::MissingKey {
            section: "output.height".to_string(),
            key: "value_name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing key 'value_name' in section [output.height]"
        );
    }
}
