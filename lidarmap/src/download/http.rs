//! HTTP tile fetcher.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use super::{FetchError, FetchResult, TileFetcher};
use crate::tile::part_path;

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Fetches tiles with a blocking reqwest client.
///
/// The body is streamed into `{dest}.part` and renamed over `dest` once the
/// transfer completes, so an interrupted download never looks like a tile.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn stream_to(&self, url: &str, part: &Path) -> FetchResult<u64> {
        let mut response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                FetchError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::DownloadFailed {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }

        let file = File::create(part).map_err(|e| FetchError::WriteFailed {
            path: part.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| FetchError::DownloadFailed {
                    url: url.to_string(),
                    reason: format!("Read error: {}", e),
                })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| FetchError::WriteFailed {
                    path: part.to_path_buf(),
                    source: e,
                })?;
            downloaded += bytes_read as u64;
        }

        writer.flush().map_err(|e| FetchError::WriteFailed {
            path: part.to_path_buf(),
            source: e,
        })?;

        Ok(downloaded)
    }
}

impl TileFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> FetchResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let part = part_path(dest);
        let bytes = match self.stream_to(url, &part) {
            Ok(bytes) => bytes,
            Err(e) => {
                fs::remove_file(&part).ok();
                return Err(e);
            }
        };

        fs::rename(&part, dest).map_err(|e| FetchError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
        debug!(url, bytes, dest = %dest.display(), "Tile downloaded");
        Ok(bytes)
    }
}
