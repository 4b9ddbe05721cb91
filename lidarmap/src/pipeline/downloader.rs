//! Download worker pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span};

use super::backlog::POLL_INTERVAL;
use super::{DownloadRequest, PipelineContext};

/// Pop download requests until the run shuts down.
pub(crate) fn run_download_worker(ctx: Arc<PipelineContext>, worker: usize) {
    debug!(worker, "Download worker started");
    while let Some(job) = ctx.downloads.pop() {
        let span = info_span!("download", worker, tile = %job.tile.id());
        let _enter = span.enter();

        let result = panic::catch_unwind(AssertUnwindSafe(|| download_one(&ctx, &job)));
        if result.is_err() {
            error!("Download worker recovered from a panic");
            ctx.registry.release(&job.tile.url);
            ctx.metrics.download_failed();
        }
    }
    debug!(worker, "Download worker stopped");
}

fn download_one(ctx: &PipelineContext, request: &DownloadRequest) {
    let backoff = ctx
        .config
        .processing
        .retry_backoff
        .saturating_mul(request.attempt.saturating_sub(1));
    if !backoff.is_zero() {
        debug!(attempt = request.attempt, ?backoff, "Backing off before retry");
        if !sleep_unless_shut_down(ctx, backoff) {
            ctx.registry.release(&request.tile.url);
            return;
        }
    }

    info!(attempt = request.attempt, url = %request.tile.url, "Downloading tile");
    let result = ctx
        .fetcher
        .fetch(&request.tile.url, &request.tile.local_path);
    ctx.registry.release(&request.tile.url);

    match result {
        Ok(bytes) => {
            ctx.metrics.download_completed(bytes);
            info!(bytes, "Download complete");
            if ctx.processing.push(request.tile.clone()).is_err() {
                debug!("Shutting down, downloaded tile left for the next run");
            }
        }
        Err(e) => {
            ctx.metrics.download_failed();
            error!(attempt = request.attempt, error = %e, "Download failed");
        }
    }
}

/// Sleep for `duration` in short steps. Returns `false` if shutdown was
/// requested meanwhile.
fn sleep_unless_shut_down(ctx: &PipelineContext, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if ctx.tracker.is_shut_down() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
