//! Continuation guard.
//!
//! Before any work is done for a (tile, output) pair the guard decides, from
//! the filesystem alone, whether the work is already done, can start now, or
//! needs the raw tile fetched first. Inspection is pure; the only side
//! effects live in [`ContinuationGuard::resolve`] (restoring a raw tile from
//! its archive) and [`ContinuationGuard::purge`] (discarding unusable tile
//! files). Scheduling the download itself is left to the caller, which knows
//! whether it may block on the download backlog.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::archive::ArchiveManager;
use crate::tile::TileReference;

/// Filesystem state of one tile with respect to one raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileState {
    /// The raster exists.
    Done,
    /// The raw tile is on disk.
    Local,
    /// Only the archive is on disk.
    ArchivedOnly { archive: PathBuf },
    /// Nothing local; the tile must be fetched.
    Remote,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    AlreadyDone,
    ReadyToProcess,
    MustDownload,
}

/// Classify `tile` for the raster at `target` without touching anything.
pub fn inspect(archive: &ArchiveManager, tile: &TileReference, target: &Path) -> TileState {
    if target.is_file() {
        return TileState::Done;
    }
    if tile.local_path.is_file() {
        return TileState::Local;
    }
    let archive = archive.archive_path(&tile.local_path);
    if archive.is_file() {
        return TileState::ArchivedOnly { archive };
    }
    TileState::Remote
}

/// Filesystem-backed resume logic shared by enumeration and processing.
#[derive(Debug, Clone)]
pub struct ContinuationGuard {
    archive: ArchiveManager,
}

impl ContinuationGuard {
    pub fn new(archive: ArchiveManager) -> Self {
        Self { archive }
    }

    pub fn inspect(&self, tile: &TileReference, target: &Path) -> TileState {
        inspect(&self.archive, tile, target)
    }

    /// Bring `tile` to a state where the raster at `target` can be produced.
    ///
    /// An archived-only tile is decompressed in place. If that fails the
    /// archive and any raw remnant are deleted and a download is required.
    pub fn resolve(&self, tile: &TileReference, target: &Path) -> Continuation {
        match self.inspect(tile, target) {
            TileState::Done => {
                debug!(tile = %tile.id(), target = %target.display(), "Raster exists, skipping");
                Continuation::AlreadyDone
            }
            TileState::Local => Continuation::ReadyToProcess,
            TileState::ArchivedOnly { archive } => {
                match self.archive.decompress(&archive, &tile.local_path) {
                    Ok(points) => {
                        info!(tile = %tile.id(), points, "Restored raw tile from archive");
                        Continuation::ReadyToProcess
                    }
                    Err(e) => {
                        warn!(tile = %tile.id(), error = %e, "Archive unusable, discarding it");
                        self.purge(tile);
                        Continuation::MustDownload
                    }
                }
            }
            TileState::Remote => Continuation::MustDownload,
        }
    }

    /// Delete the raw tile and its archive.
    ///
    /// Missing files are not an error.
    pub fn purge(&self, tile: &TileReference) {
        remove_if_present(&tile.local_path);
        remove_if_present(&self.archive.archive_path(&tile.local_path));
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::StorageLayout;
    use las::{Builder, Point, Writer};

    struct Fixture {
        _dir: tempfile::TempDir,
        guard: ContinuationGuard,
        archive: ArchiveManager,
        tile: TileReference,
        target: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("las"), dir.path().join("laz"), "/las/");
        let tile = TileReference::from_url("https://host/las/4311/a.las", &layout).unwrap();
        let target = dir.path().join("out").join(&tile.output_name);
        let archive = ArchiveManager::new(layout);
        Fixture {
            guard: ContinuationGuard::new(archive.clone()),
            archive,
            tile,
            target,
            _dir: dir,
        }
    }

    fn write_las(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let header = Builder::from((1, 2)).into_header().unwrap();
        let mut writer = Writer::from_path(path, header).unwrap();
        writer
            .write_point(Point {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                ..Default::default()
            })
            .unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_inspect_states() {
        let f = fixture();
        assert_eq!(f.guard.inspect(&f.tile, &f.target), TileState::Remote);

        write_las(&f.tile.local_path);
        assert_eq!(f.guard.inspect(&f.tile, &f.target), TileState::Local);

        f.archive.compress(&f.tile.local_path).unwrap();
        fs::remove_file(&f.tile.local_path).unwrap();
        assert!(matches!(
            f.guard.inspect(&f.tile, &f.target),
            TileState::ArchivedOnly { .. }
        ));

        fs::create_dir_all(f.target.parent().unwrap()).unwrap();
        fs::write(&f.target, b"tif").unwrap();
        assert_eq!(f.guard.inspect(&f.tile, &f.target), TileState::Done);
    }

    #[test]
    fn test_resolve_done_and_remote() {
        let f = fixture();
        assert_eq!(f.guard.resolve(&f.tile, &f.target), Continuation::MustDownload);

        fs::create_dir_all(f.target.parent().unwrap()).unwrap();
        fs::write(&f.target, b"tif").unwrap();
        assert_eq!(f.guard.resolve(&f.tile, &f.target), Continuation::AlreadyDone);
    }

    #[test]
    fn test_resolve_restores_from_archive() {
        let f = fixture();
        write_las(&f.tile.local_path);
        f.archive.compress(&f.tile.local_path).unwrap();
        fs::remove_file(&f.tile.local_path).unwrap();

        assert_eq!(f.guard.resolve(&f.tile, &f.target), Continuation::ReadyToProcess);
        assert!(f.tile.local_path.is_file());
        assert!(f.archive.archive_path(&f.tile.local_path).is_file());
    }

    #[test]
    fn test_resolve_discards_corrupt_archive() {
        let f = fixture();
        let archive = f.archive.archive_path(&f.tile.local_path);
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, b"not a laz file").unwrap();

        assert_eq!(f.guard.resolve(&f.tile, &f.target), Continuation::MustDownload);
        assert!(!archive.exists());
        assert!(!f.tile.local_path.exists());
    }

    #[test]
    fn test_purge_tolerates_missing_files() {
        let f = fixture();
        f.guard.purge(&f.tile);
        write_las(&f.tile.local_path);
        f.guard.purge(&f.tile);
        assert!(!f.tile.local_path.exists());
    }

    #[test]
    fn test_purge_removes_raw_tile_and_archive() {
        let f = fixture();
        write_las(&f.tile.local_path);
        f.archive.compress(&f.tile.local_path).unwrap();
        let archive = f.archive.archive_path(&f.tile.local_path);
        assert!(archive.is_file());

        f.guard.purge(&f.tile);
        assert!(!f.tile.local_path.exists());
        assert!(!archive.exists());
    }
}
