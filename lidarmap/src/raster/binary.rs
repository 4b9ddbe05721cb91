//! Binary-mask generator.

use image::{GrayImage, Luma};

use super::{grid_dimensions, GeoTransform, Grid, RasterError, RasterResult};
use crate::pointcloud::PointCloudTile;

/// Value of pixels no matching point touched.
pub(super) const NODATA: u8 = 0;

/// Value of pixels touched by a matching point.
const MASK: u8 = 255;

/// Mark every pixel holding at least one point of class `point_class`.
///
/// The grid covers the bounding box of all points, not only matching ones.
/// Rows count up from `minY`; the transform's negative pixel height makes the
/// result georeference correctly.
pub(super) fn render(tile: &PointCloudTile, point_class: u8) -> RasterResult<(Grid, GeoTransform)> {
    let bounds = tile.bounds().ok_or(RasterError::EmptyTile)?;
    let (width, height) = grid_dimensions(&bounds, 1)?;

    let mut img = GrayImage::from_pixel(width, height, Luma([NODATA]));
    for point in tile
        .points()
        .iter()
        .filter(|p| p.classification == point_class)
    {
        let px = (point.x - bounds.min_x) as u32;
        let py = (point.y - bounds.min_y) as u32;
        img.put_pixel(px, py, Luma([MASK]));
    }

    let transform = GeoTransform::from_origin(bounds.min_x as f64, bounds.min_y as f64, 1.0, -1.0);
    Ok((Grid::Gray(img), transform))
}
