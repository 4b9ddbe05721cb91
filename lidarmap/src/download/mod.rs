//! Tile downloads.
//!
//! [`TileFetcher`] is the seam between the pipeline and the network: the
//! download workers only ever see the trait, so tests drive the whole
//! pipeline with an in-memory fetcher. [`DownloadRegistry`] bounds how often
//! one URL may be fetched during a run.

mod http;
mod registry;

pub use http::HttpFetcher;
pub use registry::{Admission, DownloadRegistry};

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors raised while fetching a tile.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("download of {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Retrieves one remote tile into a local file.
pub trait TileFetcher: Send + Sync {
    /// Fetch `url` into `dest`, creating parent directories.
    ///
    /// Returns the number of bytes written. On error `dest` must not exist.
    fn fetch(&self, url: &str, dest: &Path) -> FetchResult<u64>;
}
