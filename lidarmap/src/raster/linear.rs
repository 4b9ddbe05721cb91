//! Linear-scale generator.

use image::{GrayImage, Luma};

use super::{grid_dimensions, GeoTransform, Grid, RasterError, RasterResult};
use crate::pointcloud::{Attribute, PointCloudTile};

/// Map `value` from `[min_value, max_value]` onto `0..=255`.
///
/// Out-of-range values are clipped, never wrapped.
pub fn scale_value(value: f64, min_value: f64, max_value: f64) -> u8 {
    let scaled = (value - min_value) / (max_value - min_value) * 255.0;
    scaled.round().clamp(0.0, 255.0) as u8
}

/// Write each point's rescaled `attribute` at `(x - minX, y - minY)`.
///
/// Points sharing a pixel overwrite each other in file order.
pub(super) fn render(
    tile: &PointCloudTile,
    attribute: Attribute,
    min_value: f64,
    max_value: f64,
) -> RasterResult<(Grid, GeoTransform)> {
    if min_value.is_nan() || max_value.is_nan() || min_value >= max_value {
        return Err(RasterError::InvalidParams(format!(
            "min_value {} must be below max_value {}",
            min_value, max_value
        )));
    }
    let bounds = tile.bounds().ok_or(RasterError::EmptyTile)?;
    let (width, height) = grid_dimensions(&bounds, 1)?;

    let mut img = GrayImage::new(width, height);
    for point in tile.points() {
        let value = point
            .attribute(attribute)
            .ok_or(RasterError::MissingAttribute(attribute))?;
        let px = (point.x - bounds.min_x) as u32;
        let py = (point.y - bounds.min_y) as u32;
        img.put_pixel(px, py, Luma([scale_value(value, min_value, max_value)]));
    }

    let transform = GeoTransform::from_origin(bounds.min_x as f64, bounds.min_y as f64, 1.0, -1.0);
    Ok((Grid::Gray(img), transform))
}
