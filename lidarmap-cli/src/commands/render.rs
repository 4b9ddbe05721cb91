//! Render command - rasterize one local LAS file with every enabled output.

use std::path::{Path, PathBuf};

use lidarmap::config::{GeneratorConfig, PipelineConfig};
use lidarmap::pipeline::render_output;
use lidarmap::pointcloud::PointCloudTile;
use lidarmap::tile::RASTER_EXTENSION;

use super::load_config;
use crate::error::CliError;

/// Arguments for the render command.
pub struct RenderArgs {
    pub config: PathBuf,
    pub input: PathBuf,
    pub force: bool,
}

/// Where the raster for `input` goes for one output rule.
pub fn target_path(output: &GeneratorConfig, input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tile"));
    output.output_dir.join(name.with_extension(RASTER_EXTENSION))
}

/// Run the render command.
pub fn run(args: RenderArgs) -> Result<(), CliError> {
    let (config, _guard) = load_config(&args.config)?;
    render(&config, &args.input, args.force)
}

fn render(config: &PipelineConfig, input: &Path, force: bool) -> Result<(), CliError> {
    let points = PointCloudTile::read(input)?;
    println!("Read {} points from {}", points.len(), input.display());

    let mut failures = Vec::new();
    for output in config.enabled_outputs() {
        let target = target_path(output, input);
        if target.is_file() && !force {
            println!("  {:<16} exists, skipped ({})", output.name, target.display());
            continue;
        }
        match render_output(&points, output, config.processing.epsg, &target) {
            Ok(()) => println!("  {:<16} {}", output.name, target.display()),
            Err(e) => {
                println!("  {:<16} FAILED: {}", output.name, e);
                failures.push(format!("{}: {}", output.name, e));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(CliError::Render(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_path_uses_file_stem() {
        let output = GeneratorConfig::binary("b", "/out/buildings", 6);
        assert_eq!(
            target_path(&output, Path::new("/data/las/4311/4311-34-13.las")),
            PathBuf::from("/out/buildings/4311-34-13.tif")
        );
    }

    #[test]
    fn test_render_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path())
            .with_output(GeneratorConfig::binary("b", dir.path().join("out"), 6));
        let err = render(&config, &dir.path().join("missing.las"), false).unwrap_err();
        assert!(matches!(err, CliError::Decode(_)));
    }
}
