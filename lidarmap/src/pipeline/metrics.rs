//! Run counters.
//!
//! ```text
//! workers ─────► RunMetrics ─────► RunSummary
//!               (atomic counters)  (point-in-time copy)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by every stage of a run.
#[derive(Debug, Default)]
pub struct RunMetrics {
    tiles_listed: AtomicU64,
    tiles_rejected: AtomicU64,
    tiles_skipped: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    downloads_abandoned: AtomicU64,
    bytes_downloaded: AtomicU64,
    rasters_written: AtomicU64,
    rasters_failed: AtomicU64,
    tiles_archived: AtomicU64,
    archive_failures: AtomicU64,
    corrupt_tiles: AtomicU64,
    backlog_overflows: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tile_listed(&self) {
        bump(&self.tiles_listed);
    }

    pub fn tile_rejected(&self) {
        bump(&self.tiles_rejected);
    }

    pub fn tile_skipped(&self) {
        bump(&self.tiles_skipped);
    }

    pub fn download_completed(&self, bytes: u64) {
        bump(&self.downloads_completed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn download_failed(&self) {
        bump(&self.downloads_failed);
    }

    pub fn download_abandoned(&self) {
        bump(&self.downloads_abandoned);
    }

    pub fn raster_written(&self) {
        bump(&self.rasters_written);
    }

    pub fn raster_failed(&self) {
        bump(&self.rasters_failed);
    }

    pub fn tile_archived(&self) {
        bump(&self.tiles_archived);
    }

    pub fn archive_failed(&self) {
        bump(&self.archive_failures);
    }

    pub fn corrupt_tile(&self) {
        bump(&self.corrupt_tiles);
    }

    pub fn backlog_overflow(&self) {
        bump(&self.backlog_overflows);
    }

    pub fn snapshot(&self) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            tiles_listed: load(&self.tiles_listed),
            tiles_rejected: load(&self.tiles_rejected),
            tiles_skipped: load(&self.tiles_skipped),
            downloads_completed: load(&self.downloads_completed),
            downloads_failed: load(&self.downloads_failed),
            downloads_abandoned: load(&self.downloads_abandoned),
            bytes_downloaded: load(&self.bytes_downloaded),
            rasters_written: load(&self.rasters_written),
            rasters_failed: load(&self.rasters_failed),
            tiles_archived: load(&self.tiles_archived),
            archive_failures: load(&self.archive_failures),
            corrupt_tiles: load(&self.corrupt_tiles),
            backlog_overflows: load(&self.backlog_overflows),
            interrupted: false,
        }
    }
}

/// What a finished (or interrupted) run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// URLs read from the manifest.
    pub tiles_listed: u64,
    /// URLs that could not be mapped to local paths.
    pub tiles_rejected: u64,
    /// Tiles whose every raster already existed.
    pub tiles_skipped: u64,
    pub downloads_completed: u64,
    pub downloads_failed: u64,
    /// Downloads not attempted because the per-run limit was reached.
    pub downloads_abandoned: u64,
    pub bytes_downloaded: u64,
    pub rasters_written: u64,
    pub rasters_failed: u64,
    pub tiles_archived: u64,
    pub archive_failures: u64,
    /// Raw tiles that failed to decode and were discarded.
    pub corrupt_tiles: u64,
    /// Recovery downloads dropped because the download backlog was full.
    pub backlog_overflows: u64,
    /// The run stopped on request before the backlogs drained.
    pub interrupted: bool,
}

impl RunSummary {
    /// Whether anything went wrong during the run.
    pub fn has_failures(&self) -> bool {
        self.downloads_failed > 0
            || self.downloads_abandoned > 0
            || self.rasters_failed > 0
            || self.archive_failures > 0
            || self.corrupt_tiles > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles listed, {} skipped, {} rejected; {} downloads ({} failed, {} abandoned); \
             {} rasters written ({} failed); {} tiles archived; {} corrupt tiles",
            self.tiles_listed,
            self.tiles_skipped,
            self.tiles_rejected,
            self.downloads_completed,
            self.downloads_failed,
            self.downloads_abandoned,
            self.rasters_written,
            self.rasters_failed,
            self.tiles_archived,
            self.corrupt_tiles,
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}
