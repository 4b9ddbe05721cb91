//! Tile manifest sources.
//!
//! A manifest is a newline-delimited list of tile URLs. It is fetched once per
//! run; the pipeline never re-reads it.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;

/// Errors raised while fetching a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to fetch manifest from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can produce the manifest text.
pub trait ManifestSource: Send + Sync {
    /// Fetch the tile URLs in manifest order.
    fn fetch(&self) -> Result<Vec<String>, ManifestError>;
}

/// Manifest served over HTTP.
pub struct HttpManifest {
    url: String,
    client: Client,
}

impl HttpManifest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ManifestError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ManifestError::Fetch {
                url: url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { url, client })
    }
}

impl ManifestSource for HttpManifest {
    fn fetch(&self) -> Result<Vec<String>, ManifestError> {
        let fetch_err = |reason: String| ManifestError::Fetch {
            url: self.url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }
        let text = response.text().map_err(|e| fetch_err(e.to_string()))?;

        Ok(parse_manifest(&text))
    }
}

/// Manifest stored on the local filesystem.
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ManifestSource for FileManifest {
    fn fetch(&self) -> Result<Vec<String>, ManifestError> {
        let text = fs::read_to_string(&self.path).map_err(|source| ManifestError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_manifest(&text))
    }
}

/// Split manifest text into URLs.
///
/// Accepts `\n` and `\r\n` line endings, drops blank lines and keeps only
/// the first occurrence of each URL.
pub fn parse_manifest(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_line_endings() {
        let text = "https://a/las/1/a.las\r\nhttps://a/las/1/b.las\r\n\r\nhttps://a/las/2/c.las\n";
        assert_eq!(
            parse_manifest(text),
            vec![
                "https://a/las/1/a.las",
                "https://a/las/1/b.las",
                "https://a/las/2/c.las",
            ]
        );
    }

    #[test]
    fn test_parse_manifest_drops_duplicates() {
        let text = "u1\nu2\nu1\n  u2  \n";
        assert_eq!(parse_manifest(text), vec!["u1", "u2"]);
    }

    #[test]
    fn test_file_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        fs::write(&path, "https://a/las/1/a.las\n").unwrap();

        let urls = FileManifest::new(&path).fetch().unwrap();
        assert_eq!(urls, vec!["https://a/las/1/a.las"]);
    }

    #[test]
    fn test_file_manifest_missing() {
        let err = FileManifest::new("/nonexistent/list.txt").fetch().unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }

    #[test]
    fn test_http_manifest_unreachable() {
        let source = HttpManifest::new("http://127.0.0.1:9/list.txt", Duration::from_secs(2)).unwrap();
        let err = source.fetch().unwrap_err();
        assert!(matches!(err, ManifestError::Fetch { .. }));
    }
}
