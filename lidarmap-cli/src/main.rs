//! Lidarmap CLI - Command-line interface
//!
//! This binary provides a command-line interface to the lidarmap library.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::archive::{CompressArgs, DecompressArgs};
use commands::render::RenderArgs;
use commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(name = "lidarmap")]
#[command(version, about = "Rasterize LiDAR survey tiles into GeoTIFFs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and rasterize every tile listed in the manifest
    Run {
        /// Configuration file
        #[arg(short, long, default_value = "config.ini")]
        config: PathBuf,

        /// Read tile URLs from a local file instead of the configured URL
        #[arg(long)]
        manifest_file: Option<PathBuf>,
    },

    /// Rasterize a local LAS/LAZ file with every enabled output
    Render {
        /// Configuration file
        #[arg(short, long, default_value = "config.ini")]
        config: PathBuf,

        /// Point cloud to render
        input: PathBuf,

        /// Overwrite rasters that already exist
        #[arg(long)]
        force: bool,
    },

    /// Archive a raw LAS tile into the configured LAZ tree
    Compress {
        /// Configuration file
        #[arg(short, long, default_value = "config.ini")]
        config: PathBuf,

        /// Raw tile to archive
        input: PathBuf,
    },

    /// Restore a LAS file from a LAZ archive
    Decompress {
        /// Archive to read
        input: PathBuf,

        /// LAS file to write
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            manifest_file,
        } => commands::run::run(RunArgs {
            config,
            manifest_file,
        }),
        Commands::Render {
            config,
            input,
            force,
        } => commands::render::run(RenderArgs {
            config,
            input,
            force,
        }),
        Commands::Compress { config, input } => {
            commands::archive::compress(CompressArgs { config, input })
        }
        Commands::Decompress { input, output } => {
            commands::archive::decompress(DecompressArgs { input, output })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
