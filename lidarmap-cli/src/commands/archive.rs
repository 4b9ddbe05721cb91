//! Compress and decompress commands.

use std::path::PathBuf;

use lidarmap::archive::{decompress_file, ArchiveManager, CompressOutcome};
use lidarmap::tile::StorageLayout;

use super::load_config;
use crate::error::CliError;

/// Arguments for the compress command.
pub struct CompressArgs {
    pub config: PathBuf,
    pub input: PathBuf,
}

/// Archive one raw tile into the configured LAZ tree.
pub fn compress(args: CompressArgs) -> Result<(), CliError> {
    let (config, _guard) = load_config(&args.config)?;
    let manager = ArchiveManager::new(StorageLayout::from_config(&config));

    match manager.compress(&args.input)? {
        CompressOutcome::Compressed { archive, points } => {
            println!("Archived {} points to {}", points, archive.display());
        }
        CompressOutcome::AlreadyArchived { archive } => {
            println!("Archive already exists: {}", archive.display());
        }
    }
    Ok(())
}

/// Arguments for the decompress command.
pub struct DecompressArgs {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Restore a LAS file from a LAZ archive.
pub fn decompress(args: DecompressArgs) -> Result<(), CliError> {
    let points = decompress_file(&args.input, &args.output)?;
    println!("Restored {} points to {}", points, args.output.display());
    Ok(())
}
