//! Run command - process every tile in the manifest.

use std::path::PathBuf;

use lidarmap::pipeline::Pipeline;
use lidarmap::tile::manifest::{FileManifest, HttpManifest, ManifestSource};

use super::load_config;
use crate::error::CliError;

/// Arguments for the run command.
pub struct RunArgs {
    pub config: PathBuf,
    pub manifest_file: Option<PathBuf>,
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let (config, _guard) = load_config(&args.config)?;

    let manifest: Box<dyn ManifestSource> = match args.manifest_file {
        Some(path) => Box::new(FileManifest::new(path)),
        None => Box::new(HttpManifest::new(
            config.manifest.url.clone(),
            config.processing.download_timeout,
        )?),
    };

    let pipeline = Pipeline::with_http(config)?;
    let shutdown = pipeline.shutdown_handle();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received shutdown signal, finishing current tiles...");
        shutdown.shut_down();
    })
    .map_err(|e| CliError::SignalHandler(e.to_string()))?;

    let summary = pipeline.run(manifest.as_ref())?;

    println!();
    println!("Tiles listed:      {}", summary.tiles_listed);
    println!("Already complete:  {}", summary.tiles_skipped);
    println!("Rejected URLs:     {}", summary.tiles_rejected);
    println!(
        "Downloads:         {} ({} failed, {} abandoned)",
        summary.downloads_completed, summary.downloads_failed, summary.downloads_abandoned
    );
    println!(
        "Rasters written:   {} ({} failed)",
        summary.rasters_written, summary.rasters_failed
    );
    println!("Tiles archived:    {}", summary.tiles_archived);
    println!("Corrupt tiles:     {}", summary.corrupt_tiles);
    if summary.interrupted {
        println!();
        println!("Run interrupted; start it again to continue where it stopped.");
    }
    Ok(())
}
