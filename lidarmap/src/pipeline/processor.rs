//! Processing worker pool.
//!
//! A processing job covers one tile and every enabled output rule. The tile
//! is decoded at most once, on the first rule that actually needs it. A tile
//! that fails to decode is treated as a corrupt download: its files are
//! discarded and a fresh fetch is requested without blocking, since the
//! download pool may itself be waiting on the processing backlog.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use super::guard::Continuation;
use super::{Enqueue, PipelineContext};
use crate::archive::CompressOutcome;
use crate::config::GeneratorConfig;
use crate::pointcloud::PointCloudTile;
use crate::raster::{rasterize, write_geotiff, RasterResult};
use crate::tile::TileReference;

/// Rasterize `points` for one output rule and write the GeoTIFF to `target`.
pub fn render_output(
    points: &PointCloudTile,
    output: &GeneratorConfig,
    epsg: u16,
    target: &Path,
) -> RasterResult<()> {
    let artifact = rasterize(points, &output.params, epsg)?;
    write_geotiff(&artifact, target)
}

/// Pop processing jobs until the run shuts down.
pub(crate) fn run_processing_worker(ctx: Arc<PipelineContext>, worker: usize) {
    debug!(worker, "Processing worker started");
    while let Some(job) = ctx.processing.pop() {
        let span = info_span!("process", worker, tile = %job.id());
        let _enter = span.enter();

        let result = panic::catch_unwind(AssertUnwindSafe(|| process_tile(&ctx, &job)));
        if result.is_err() {
            error!("Processing worker recovered from a panic");
        }
    }
    debug!(worker, "Processing worker stopped");
}

fn process_tile(ctx: &PipelineContext, tile: &TileReference) {
    let mut decoded: Option<PointCloudTile> = None;

    for output in ctx.config.enabled_outputs() {
        let target = ctx.layout.output_path(output, tile);
        match ctx.guard.resolve(tile, &target) {
            Continuation::AlreadyDone => continue,
            Continuation::MustDownload => {
                // Later outputs need the same raw tile; the fetched job covers them.
                ctx.schedule_download(tile, Enqueue::IfRoom);
                return;
            }
            Continuation::ReadyToProcess => {}
        }

        if decoded.is_none() {
            match PointCloudTile::read(&tile.local_path) {
                Ok(points) => {
                    debug!(points = points.len(), "Tile decoded");
                    decoded = Some(points);
                }
                Err(e) => {
                    warn!(error = %e, "Tile is corrupt, discarding it and downloading again");
                    ctx.metrics.corrupt_tile();
                    ctx.guard.purge(tile);
                    ctx.schedule_download(tile, Enqueue::IfRoom);
                    return;
                }
            }
        }
        let Some(points) = decoded.as_ref() else {
            continue;
        };

        match render_output(points, output, ctx.config.processing.epsg, &target) {
            Ok(()) => {
                ctx.metrics.raster_written();
                info!(output = %output.name, path = %target.display(), "Raster written");
            }
            Err(e) => {
                ctx.metrics.raster_failed();
                error!(output = %output.name, error = %e, "Failed to produce raster");
            }
        }
    }

    finish_tile(ctx, tile);
}

/// Archive the raw tile and remove it when configured to.
fn finish_tile(ctx: &PipelineContext, tile: &TileReference) {
    let raw = &tile.local_path;
    if !raw.is_file() {
        return;
    }

    let processing = &ctx.config.processing;
    let archived = if processing.compress_to_laz {
        match ctx.archive.compress(raw) {
            Ok(CompressOutcome::Compressed { archive, points }) => {
                ctx.metrics.tile_archived();
                info!(archive = %archive.display(), points, "Tile archived");
                true
            }
            Ok(CompressOutcome::AlreadyArchived { .. }) => true,
            Err(e) => {
                ctx.metrics.archive_failed();
                warn!(error = %e, "Failed to archive tile, keeping raw file");
                false
            }
        }
    } else {
        true
    };

    if processing.delete_las_after_processing && archived {
        match fs::remove_file(raw) {
            Ok(()) => debug!(path = %raw.display(), "Removed raw tile"),
            Err(e) => warn!(path = %raw.display(), error = %e, "Failed to remove raw tile"),
        }
    }
}
