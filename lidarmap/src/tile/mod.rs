//! Tile addressing.
//!
//! A tile URL such as `https://host/lgia-opendata/las/4311/4311-34-13.las`
//! maps onto three local locations that share the `4311/4311-34-13` part:
//!
//! ```text
//! {las_path}/4311/4311-34-13.las       raw tile
//! {laz_path}/4311/4311-34-13.laz       archive
//! {output}/4311/4311-34-13.tif         one raster per output rule
//! ```

pub mod manifest;

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::{GeneratorConfig, PipelineConfig};

/// Extension of raw tiles.
pub const RAW_EXTENSION: &str = "las";

/// Extension of archived tiles.
pub const ARCHIVE_EXTENSION: &str = "laz";

/// Extension of rasters.
pub const RASTER_EXTENSION: &str = "tif";

/// A manifest URL that cannot be mapped to local paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    #[error("URL {url} does not contain '{marker}'")]
    MissingMarker { url: String, marker: String },

    #[error("URL {0} does not name a .las file")]
    NotLas(String),

    #[error("URL {0} escapes the storage root")]
    UnsafePath(String),
}

/// One remote tile and the paths derived from it.
///
/// Immutable once created; every stage receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileReference {
    /// Remote location of the raw tile.
    pub url: String,

    /// Where the raw tile is stored locally.
    pub local_path: PathBuf,

    /// Raster path relative to each output directory.
    pub output_name: PathBuf,
}

impl TileReference {
    pub fn new(
        url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        output_name: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            output_name: output_name.into(),
        }
    }

    /// Derive a reference from a manifest URL.
    pub fn from_url(url: &str, layout: &StorageLayout) -> Result<Self, TileError> {
        let url = url.trim();
        let (_, relative) =
            url.split_once(layout.path_marker.as_str())
                .ok_or_else(|| TileError::MissingMarker {
                    url: url.to_string(),
                    marker: layout.path_marker.clone(),
                })?;

        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(TileError::UnsafePath(url.to_string()));
        }
        let is_las = relative
            .extension()
            .map(|e| e.eq_ignore_ascii_case(RAW_EXTENSION))
            .unwrap_or(false);
        if !is_las || relative.file_stem().is_none() {
            return Err(TileError::NotLas(url.to_string()));
        }

        Ok(Self {
            url: url.to_string(),
            local_path: layout.raw_root.join(relative),
            output_name: relative.with_extension(RASTER_EXTENSION),
        })
    }

    /// Tile identifier used in logs, e.g. `4311/4311-34-13`.
    pub fn id(&self) -> String {
        self.output_name
            .with_extension("")
            .to_string_lossy()
            .into_owned()
    }
}

/// Sibling path used while a file is being written.
///
/// Writers produce `{name}.part` and rename it over `{name}` once complete.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Root directories shared by every tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub raw_root: PathBuf,
    pub archive_root: PathBuf,
    pub path_marker: String,
}

impl StorageLayout {
    pub fn new(
        raw_root: impl Into<PathBuf>,
        archive_root: impl Into<PathBuf>,
        path_marker: impl Into<String>,
    ) -> Self {
        Self {
            raw_root: raw_root.into(),
            archive_root: archive_root.into(),
            path_marker: path_marker.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            &config.processing.las_path,
            &config.processing.laz_path,
            &config.manifest.path_marker,
        )
    }

    /// Archive location for a raw tile.
    ///
    /// Keeps the raw tile's parent directory name and swaps the root and
    /// extension: `{las}/4311/a.las` becomes `{laz}/4311/a.laz`.
    pub fn archive_path(&self, raw: &Path) -> PathBuf {
        let mut path = self.archive_root.clone();
        if let Some(dir) = raw.parent().and_then(Path::file_name) {
            path.push(dir);
        }
        if let Some(name) = raw.file_name() {
            path.push(name);
        }
        path.set_extension(ARCHIVE_EXTENSION);
        path
    }

    /// Raster location of `tile` for one output rule.
    pub fn output_path(&self, output: &GeneratorConfig, tile: &TileReference) -> PathBuf {
        output.output_dir.join(&tile.output_name)
    }
}
