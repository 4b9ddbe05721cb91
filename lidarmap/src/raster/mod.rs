//! Rasterization engine.
//!
//! Three stateless generators turn a [`PointCloudTile`] into a
//! [`RasterArtifact`]:
//!
//! | Kind     | Bands | Row for point `y` | Transform origin  |
//! |----------|-------|-------------------|-------------------|
//! | `color`  | RGBA  | `maxY - y`        | `(minX, maxY)`    |
//! | `binary` | 1     | `y - minY`        | `(minX, minY)`    |
//! | `linear` | 1     | `y - minY`        | `(minX, minY)`    |
//!
//! Each generator pairs its row order with its own transform.

mod binary;
mod color;
mod geotiff;
mod linear;

use std::path::PathBuf;

use image::{GrayImage, RgbaImage};
use thiserror::Error;

use crate::config::GeneratorParams;
use crate::pointcloud::{Attribute, PointCloudTile, TileBounds};

pub use geotiff::write_geotiff;
pub use linear::scale_value;

/// Largest grid the engine will allocate, in pixels.
pub const MAX_GRID_PIXELS: u64 = 1 << 30;

/// Result type for rasterization.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors raised while producing or writing a raster.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The tile holds no points, so no grid can be derived.
    #[error("tile contains no points")]
    EmptyTile,

    /// The bounding box yields a grid beyond [`MAX_GRID_PIXELS`].
    #[error("grid of {width}×{height} pixels exceeds the allocation limit")]
    TooLarge { width: u64, height: u64 },

    /// Generator parameters are unusable.
    #[error("invalid generator parameters: {0}")]
    InvalidParams(String),

    /// The tile's point format does not carry the requested attribute.
    #[error("point attribute '{0}' is not present in this tile")]
    MissingAttribute(Attribute),

    /// GeoTIFF encoding failed.
    #[error("failed to encode GeoTIFF: {0}")]
    Encode(#[from] tiff::TiffError),

    /// Filesystem access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pixel storage for a raster.
#[derive(Debug, Clone, PartialEq)]
pub enum Grid {
    Rgba(RgbaImage),
    Gray(GrayImage),
}

impl Grid {
    pub fn width(&self) -> u32 {
        match self {
            Grid::Rgba(img) => img.width(),
            Grid::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Grid::Rgba(img) => img.height(),
            Grid::Gray(img) => img.height(),
        }
    }
}

/// Affine georeferencing for a north-aligned grid.
///
/// Follows the from-origin convention: `pixel_height` is positive when rows
/// run southward from the origin, and negative when they run northward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_origin(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    pub fn is_north_up(&self) -> bool {
        self.pixel_height > 0.0
    }

    /// Coefficients in GDAL order: `[x0, dx, 0, y0, 0, dy]`.
    pub fn affine(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            -self.pixel_height,
        ]
    }
}

/// A georeferenced grid ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterArtifact {
    pub grid: Grid,
    pub transform: GeoTransform,
    pub epsg: u16,
    pub nodata: Option<u8>,
}

impl RasterArtifact {
    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }
}

/// Render `tile` with the generator selected by `params`.
pub fn rasterize(
    tile: &PointCloudTile,
    params: &GeneratorParams,
    epsg: u16,
) -> RasterResult<RasterArtifact> {
    let (grid, transform, nodata) = match params {
        GeneratorParams::Color {
            color_map,
            resolution,
        } => {
            let (grid, transform) = color::render(tile, color_map, *resolution)?;
            (grid, transform, None)
        }
        GeneratorParams::Binary { point_class } => {
            let (grid, transform) = binary::render(tile, *point_class)?;
            (grid, transform, Some(binary::NODATA))
        }
        GeneratorParams::Linear {
            attribute,
            min_value,
            max_value,
        } => {
            let (grid, transform) = linear::render(tile, *attribute, *min_value, *max_value)?;
            (grid, transform, None)
        }
    };

    Ok(RasterArtifact {
        grid,
        transform,
        epsg,
        nodata,
    })
}

/// Grid size for `bounds` at `factor` pixels per coordinate unit.
///
/// Rejects grids that would not fit in memory before anything is allocated.
fn grid_dimensions(bounds: &TileBounds, factor: u32) -> RasterResult<(u32, u32)> {
    let factor = u64::from(factor);
    let scaled = |extent: Option<u64>| extent.and_then(|e| e.checked_mul(factor));
    let too_large = || RasterError::TooLarge {
        width: scaled(bounds.width()).unwrap_or(u64::MAX),
        height: scaled(bounds.height()).unwrap_or(u64::MAX),
    };

    let width = scaled(bounds.width()).ok_or_else(too_large)?;
    let height = scaled(bounds.height()).ok_or_else(too_large)?;
    let pixels = width.checked_mul(height).ok_or_else(too_large)?;
    if pixels > MAX_GRID_PIXELS {
        return Err(too_large());
    }

    Ok((width as u32, height as u32))
}
