//! Colour-classification generator.

use image::{Rgba, RgbaImage};

use super::{grid_dimensions, GeoTransform, Grid, RasterError, RasterResult};
use crate::config::ColorMap;
use crate::pointcloud::PointCloudTile;

/// Paint every point as an opaque pixel coloured by its classification.
///
/// Rows count down from `maxY`. With a resolution factor `f` each point fills
/// an `f`×`f` block; untouched pixels stay fully transparent.
pub(super) fn render(
    tile: &PointCloudTile,
    color_map: &ColorMap,
    resolution: u32,
) -> RasterResult<(Grid, GeoTransform)> {
    if resolution == 0 {
        return Err(RasterError::InvalidParams(
            "colour resolution must be at least 1".to_string(),
        ));
    }
    let bounds = tile.bounds().ok_or(RasterError::EmptyTile)?;
    let (width, height) = grid_dimensions(&bounds, resolution)?;

    let mut img = RgbaImage::new(width, height);
    for point in tile.points() {
        let [r, g, b] = color_map.color_for(point.classification);
        let px = (point.x - bounds.min_x) as u32 * resolution;
        let py = (bounds.max_y - point.y) as u32 * resolution;
        for dy in 0..resolution {
            for dx in 0..resolution {
                img.put_pixel(px + dx, py + dy, Rgba([r, g, b, 255]));
            }
        }
    }

    let pixel_size = 1.0 / f64::from(resolution);
    let transform = GeoTransform::from_origin(
        bounds.min_x as f64,
        bounds.max_y as f64,
        pixel_size,
        pixel_size,
    );
    Ok((Grid::Rgba(img), transform))
}
