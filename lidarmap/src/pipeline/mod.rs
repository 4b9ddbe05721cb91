//! Tile pipeline.
//!
//! One run reads the manifest once, classifies every tile with the
//! [`ContinuationGuard`] and seeds two bounded backlogs:
//!
//! ```text
//! manifest ─► enumerate ─┬─► downloads ─► download workers ─┐
//!                        │        ▲                          │
//!                        │        └── recovery (try_push) ───┤
//!                        └─► processing ◄────────────────────┘
//!                                 │
//!                                 ▼
//!                        processing workers
//! ```
//!
//! Download workers block when the processing backlog is full. Processing
//! workers never block on the download backlog, so the two pools cannot wait
//! on each other. The run ends when enumeration is finished and every pushed
//! item has been handled, or when shutdown is requested.

mod backlog;
mod downloader;
mod guard;
mod metrics;
mod processor;

pub use backlog::{Backlog, Job, WorkTracker, POLL_INTERVAL};
pub use guard::{inspect, Continuation, ContinuationGuard, TileState};
pub use metrics::{RunMetrics, RunSummary};
pub use processor::render_output;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveManager;
use crate::config::{GeneratorConfig, PipelineConfig};
use crate::download::{Admission, DownloadRegistry, FetchError, HttpFetcher, TileFetcher};
use crate::tile::manifest::{ManifestError, ManifestSource};
use crate::tile::{StorageLayout, TileReference};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Fetcher(#[from] FetchError),

    #[error("failed to start {pool} worker: {source}")]
    Spawn {
        pool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A queued download: the tile plus which attempt this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub tile: TileReference,
    /// Counts from 1 within a run.
    pub attempt: u32,
}

/// How a download request may be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueue {
    /// Wait for room. Only for producers no download worker waits on.
    Wait,
    /// Give up if the backlog is full.
    IfRoom,
}

/// Result of asking for a tile to be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Queued { attempt: u32 },
    AlreadyPending,
    Exhausted,
    Dropped,
}

/// State shared by the enumerator and both worker pools.
pub(crate) struct PipelineContext {
    pub(crate) config: PipelineConfig,
    pub(crate) layout: StorageLayout,
    pub(crate) archive: ArchiveManager,
    pub(crate) guard: ContinuationGuard,
    pub(crate) registry: DownloadRegistry,
    pub(crate) fetcher: Arc<dyn TileFetcher>,
    pub(crate) downloads: Backlog<DownloadRequest>,
    pub(crate) processing: Backlog<TileReference>,
    pub(crate) tracker: Arc<WorkTracker>,
    pub(crate) metrics: RunMetrics,
}

impl PipelineContext {
    /// Admit `tile` to the download backlog unless it is already pending or
    /// out of attempts.
    pub(crate) fn schedule_download(&self, tile: &TileReference, mode: Enqueue) -> ScheduleOutcome {
        let attempt = match self.registry.try_admit(&tile.url) {
            Admission::Admitted { attempt } => attempt,
            Admission::InFlight => return ScheduleOutcome::AlreadyPending,
            Admission::Exhausted { attempts } => {
                self.metrics.download_abandoned();
                warn!(tile = %tile.id(), attempts, "Download attempts exhausted for this run");
                return ScheduleOutcome::Exhausted;
            }
        };

        let request = DownloadRequest {
            tile: tile.clone(),
            attempt,
        };
        let pushed = match mode {
            Enqueue::Wait => self.downloads.push(request),
            Enqueue::IfRoom => self.downloads.try_push(request),
        };

        match pushed {
            Ok(()) => {
                debug!(tile = %tile.id(), attempt, "Download scheduled");
                ScheduleOutcome::Queued { attempt }
            }
            Err(_) => {
                self.registry.revoke(&tile.url);
                if !self.tracker.is_shut_down() {
                    self.metrics.backlog_overflow();
                    warn!(tile = %tile.id(), "Download backlog full, tile left for the next run");
                }
                ScheduleOutcome::Dropped
            }
        }
    }
}

/// Requests a running pipeline to stop.
///
/// Workers finish the item in hand and exit; blocked producers give up.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tracker: Arc<WorkTracker>,
}

impl ShutdownHandle {
    pub fn shut_down(&self) {
        self.tracker.shut_down();
    }

    pub fn is_shut_down(&self) -> bool {
        self.tracker.is_shut_down()
    }
}

/// One pipeline run.
pub struct Pipeline {
    ctx: Arc<PipelineContext>,
}

impl Pipeline {
    /// Create a pipeline that fetches tiles with `fetcher`.
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn TileFetcher>) -> Self {
        let layout = StorageLayout::from_config(&config);
        let archive = ArchiveManager::new(layout.clone());
        let tracker = Arc::new(WorkTracker::new());
        let capacity = config.processing.queue_capacity;

        let ctx = PipelineContext {
            guard: ContinuationGuard::new(archive.clone()),
            registry: DownloadRegistry::new(config.processing.max_download_attempts),
            downloads: Backlog::new(capacity, Arc::clone(&tracker)),
            processing: Backlog::new(capacity, Arc::clone(&tracker)),
            metrics: RunMetrics::new(),
            layout,
            archive,
            fetcher,
            tracker,
            config,
        };
        Self { ctx: Arc::new(ctx) }
    }

    /// Create a pipeline that fetches tiles over HTTP.
    pub fn with_http(config: PipelineConfig) -> Result<Self, PipelineError> {
        let fetcher = HttpFetcher::new(config.processing.download_timeout)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tracker: Arc::clone(&self.ctx.tracker),
        }
    }

    /// Run to completion.
    ///
    /// Per-tile failures are logged and counted in the summary; only a
    /// manifest that cannot be fetched or a pool that cannot start aborts.
    pub fn run(self, manifest: &dyn ManifestSource) -> Result<RunSummary, PipelineError> {
        let urls = manifest.fetch()?;
        let processing = &self.ctx.config.processing;
        info!(
            tiles = urls.len(),
            outputs = self.ctx.config.enabled_outputs().count(),
            download_workers = processing.download_workers,
            processing_workers = processing.processing_workers,
            "Starting run"
        );

        let workers = match self.spawn_workers() {
            Ok(workers) => workers,
            Err(e) => {
                self.ctx.tracker.shut_down();
                return Err(e);
            }
        };

        enumerate(&self.ctx, &urls);
        let drained = self.ctx.tracker.wait_idle();
        self.ctx.tracker.shut_down();

        for handle in workers {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }

        let mut summary = self.ctx.metrics.snapshot();
        summary.interrupted = !drained;
        info!(%summary, "Run finished");
        Ok(summary)
    }

    fn spawn_workers(&self) -> Result<Vec<JoinHandle<()>>, PipelineError> {
        let processing = &self.ctx.config.processing;
        let mut handles = Vec::with_capacity(processing.download_workers + processing.processing_workers);

        for id in 0..processing.download_workers {
            let ctx = Arc::clone(&self.ctx);
            let handle = thread::Builder::new()
                .name(format!("download-{}", id))
                .spawn(move || downloader::run_download_worker(ctx, id))
                .map_err(|source| PipelineError::Spawn {
                    pool: "download",
                    source,
                })?;
            handles.push(handle);
        }

        for id in 0..processing.processing_workers {
            let ctx = Arc::clone(&self.ctx);
            let handle = thread::Builder::new()
                .name(format!("process-{}", id))
                .spawn(move || processor::run_processing_worker(ctx, id))
                .map_err(|source| PipelineError::Spawn {
                    pool: "processing",
                    source,
                })?;
            handles.push(handle);
        }

        Ok(handles)
    }
}

/// Seed the backlogs from the manifest. Each tile is enqueued at most once.
fn enumerate(ctx: &PipelineContext, urls: &[String]) {
    let outputs: Vec<&GeneratorConfig> = ctx.config.enabled_outputs().collect();
    if outputs.is_empty() {
        warn!("No output is enabled, nothing to produce");
    }

    for url in urls {
        if ctx.tracker.is_shut_down() {
            info!("Shutdown requested, stopping enumeration");
            break;
        }
        ctx.metrics.tile_listed();

        let tile = match TileReference::from_url(url, &ctx.layout) {
            Ok(tile) => tile,
            Err(e) => {
                ctx.metrics.tile_rejected();
                warn!(error = %e, "Skipping manifest entry");
                continue;
            }
        };

        match plan_tile(ctx, &tile, &outputs) {
            Continuation::AlreadyDone => {
                ctx.metrics.tile_skipped();
                debug!(tile = %tile.id(), "All rasters present");
            }
            Continuation::MustDownload => {
                ctx.schedule_download(&tile, Enqueue::Wait);
            }
            Continuation::ReadyToProcess => {
                if ctx.processing.push(tile).is_err() {
                    break;
                }
            }
        }
    }
}

/// Combine the guard's verdict for every output into one action per tile.
fn plan_tile(ctx: &PipelineContext, tile: &TileReference, outputs: &[&GeneratorConfig]) -> Continuation {
    let mut plan = Continuation::AlreadyDone;
    for output in outputs {
        let target = ctx.layout.output_path(output, tile);
        match ctx.guard.resolve(tile, &target) {
            Continuation::AlreadyDone => {}
            Continuation::ReadyToProcess => plan = Continuation::ReadyToProcess,
            Continuation::MustDownload => return Continuation::MustDownload,
        }
    }
    plan
}
