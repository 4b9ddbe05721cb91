//! LAS ⇄ LAZ archival.
//!
//! Every point record is re-encoded losslessly, so decompressing an archive
//! reproduces the original point sequence. Both directions write to a `.part`
//! sibling and rename on success: the destination path either holds a
//! complete file or does not exist, which is what the continuation guard
//! relies on to detect interrupted work.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use las::{Builder, Reader, Writer};
use thiserror::Error;
use tracing::debug;

use crate::tile::{part_path, StorageLayout};

const LASZIP_USER_ID: &str = "laszip encoded";
const LASZIP_RECORD_ID: u16 = 22204;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while compressing or decompressing a tile.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: las::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: las::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of [`ArchiveManager::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOutcome {
    /// A new archive was written.
    Compressed { archive: PathBuf, points: u64 },
    /// An archive already existed and was left untouched.
    AlreadyArchived { archive: PathBuf },
}

/// Creates and restores LAZ archives of raw tiles.
#[derive(Debug, Clone)]
pub struct ArchiveManager {
    layout: StorageLayout,
}

impl ArchiveManager {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Archive location for `raw`.
    pub fn archive_path(&self, raw: &Path) -> PathBuf {
        self.layout.archive_path(raw)
    }

    /// Compress `raw` into its archive location.
    ///
    /// No-op when the archive already exists.
    pub fn compress(&self, raw: &Path) -> ArchiveResult<CompressOutcome> {
        let archive = self.archive_path(raw);
        if archive.is_file() {
            debug!(raw = %raw.display(), "Not compressing, archive already exists");
            return Ok(CompressOutcome::AlreadyArchived { archive });
        }

        debug!(raw = %raw.display(), archive = %archive.display(), "Compressing tile");
        let points = compress_file(raw, &archive)?;
        Ok(CompressOutcome::Compressed { archive, points })
    }

    /// Restore `raw` from `archive`.
    ///
    /// On failure nothing is left at `raw`; callers treat that as a corrupt
    /// archive.
    pub fn decompress(&self, archive: &Path, raw: &Path) -> ArchiveResult<u64> {
        debug!(archive = %archive.display(), raw = %raw.display(), "Decompressing tile");
        decompress_file(archive, raw)
    }
}

/// Write a LAZ copy of the LAS file `src` to `dst`. Returns the point count.
pub fn compress_file(src: &Path, dst: &Path) -> ArchiveResult<u64> {
    transcode(src, dst, true)
}

/// Write a LAS copy of the LAZ file `src` to `dst`. Returns the point count.
pub fn decompress_file(src: &Path, dst: &Path) -> ArchiveResult<u64> {
    transcode(src, dst, false)
}

/// Copy every point of `src` into `dst`, compressed or not.
fn transcode(src: &Path, dst: &Path, compress: bool) -> ArchiveResult<u64> {
    let read_err = |source| ArchiveError::Read {
        path: src.to_path_buf(),
        source,
    };
    let mut reader = Reader::from_path(src).map_err(read_err)?;

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let part = part_path(dst);
    let result = write_points(&mut reader, src, &part, compress);
    let points = match result {
        Ok(points) => points,
        Err(e) => {
            fs::remove_file(&part).ok();
            return Err(e);
        }
    };

    fs::rename(&part, dst).map_err(|source| ArchiveError::Io {
        path: dst.to_path_buf(),
        source,
    })?;
    Ok(points)
}

fn write_points(reader: &mut Reader, src: &Path, part: &Path, compress: bool) -> ArchiveResult<u64> {
    let write_err = |source| ArchiveError::Write {
        path: part.to_path_buf(),
        source,
    };

    let mut builder = Builder::from(reader.header().clone());
    builder.point_format.is_compressed = compress;
    if !compress {
        builder
            .vlrs
            .retain(|vlr| !(vlr.user_id == LASZIP_USER_ID && vlr.record_id == LASZIP_RECORD_ID));
    }
    let header = builder.into_header().map_err(write_err)?;

    let file = File::create(part).map_err(|source| ArchiveError::Io {
        path: part.to_path_buf(),
        source,
    })?;
    let mut writer = Writer::new(BufWriter::new(file), header).map_err(write_err)?;

    let mut count = 0u64;
    for point in reader.points() {
        let point = point.map_err(|source| ArchiveError::Read {
            path: src.to_path_buf(),
            source,
        })?;
        writer.write_point(point).map_err(write_err)?;
        count += 1;
    }
    writer.close().map_err(write_err)?;

    Ok(count)
}
