//! Decoded point-cloud tiles.
//!
//! A [`PointCloudTile`] is materialised from a raw LAS (or LAZ) file, handed
//! to every enabled generator and dropped afterwards. Planar coordinates are
//! truncated to integer coordinate units, which is the pixel grid every
//! generator rasterizes onto.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use las::Reader;
use thiserror::Error;

/// Result type for tile decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A raw tile could not be decoded.
///
/// The pipeline treats every variant as tile corruption.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: las::Error,
    },

    #[error("failed to read point {index} of {path}: {source}")]
    Point {
        path: PathBuf,
        index: u64,
        #[source]
        source: las::Error,
    },

    #[error("{path} declares {expected} points but holds {actual}")]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// A numeric per-point attribute that can drive a linear raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    X,
    Y,
    Z,
    Intensity,
    ReturnNumber,
    NumberOfReturns,
    Classification,
    ScanAngle,
    UserData,
    PointSourceId,
    GpsTime,
    Red,
    Green,
    Blue,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::X => "x",
            Attribute::Y => "y",
            Attribute::Z => "z",
            Attribute::Intensity => "intensity",
            Attribute::ReturnNumber => "return_number",
            Attribute::NumberOfReturns => "number_of_returns",
            Attribute::Classification => "classification",
            Attribute::ScanAngle => "scan_angle",
            Attribute::UserData => "user_data",
            Attribute::PointSourceId => "point_source_id",
            Attribute::GpsTime => "gps_time",
            Attribute::Red => "red",
            Attribute::Green => "green",
            Attribute::Blue => "blue",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let attribute = match s.trim().to_lowercase().as_str() {
            "x" => Attribute::X,
            "y" => Attribute::Y,
            "z" => Attribute::Z,
            "intensity" => Attribute::Intensity,
            "return_number" => Attribute::ReturnNumber,
            "number_of_returns" => Attribute::NumberOfReturns,
            "classification" => Attribute::Classification,
            "scan_angle" | "scan_angle_rank" => Attribute::ScanAngle,
            "user_data" => Attribute::UserData,
            "point_source_id" => Attribute::PointSourceId,
            "gps_time" => Attribute::GpsTime,
            "red" => Attribute::Red,
            "green" => Attribute::Green,
            "blue" => Attribute::Blue,
            other => return Err(format!("unknown point attribute '{}'", other)),
        };
        Ok(attribute)
    }
}

/// Scalar attributes carried alongside each point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointAttributes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
    pub return_number: u8,
    pub number_of_returns: u8,
    pub scan_angle: f32,
    pub user_data: u8,
    pub point_source_id: u16,
    pub gps_time: Option<f64>,
    pub color: Option<[u16; 3]>,
}

/// One point snapped to integer coordinate units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub x: i64,
    pub y: i64,
    pub classification: u8,
    pub attributes: PointAttributes,
}

impl PointRecord {
    /// A point with no attributes beyond its position and class.
    pub fn new(x: i64, y: i64, classification: u8) -> Self {
        Self {
            x,
            y,
            classification,
            attributes: PointAttributes {
                x: x as f64,
                y: y as f64,
                ..Default::default()
            },
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.attributes.z = z;
        self
    }

    /// Value of `attribute`, or `None` when the point format lacks it.
    pub fn attribute(&self, attribute: Attribute) -> Option<f64> {
        let a = &self.attributes;
        let value = match attribute {
            Attribute::X => a.x,
            Attribute::Y => a.y,
            Attribute::Z => a.z,
            Attribute::Intensity => a.intensity as f64,
            Attribute::ReturnNumber => a.return_number as f64,
            Attribute::NumberOfReturns => a.number_of_returns as f64,
            Attribute::Classification => self.classification as f64,
            Attribute::ScanAngle => a.scan_angle as f64,
            Attribute::UserData => a.user_data as f64,
            Attribute::PointSourceId => a.point_source_id as f64,
            Attribute::GpsTime => a.gps_time?,
            Attribute::Red => a.color?[0] as f64,
            Attribute::Green => a.color?[1] as f64,
            Attribute::Blue => a.color?[2] as f64,
        };
        Some(value)
    }
}

impl From<&las::Point> for PointRecord {
    fn from(point: &las::Point) -> Self {
        Self {
            // Truncation, not rounding: pixel (0, 0) covers [min, min + 1).
            x: point.x as i64,
            y: point.y as i64,
            classification: u8::from(point.classification),
            attributes: PointAttributes {
                x: point.x,
                y: point.y,
                z: point.z,
                intensity: point.intensity,
                return_number: point.return_number,
                number_of_returns: point.number_of_returns,
                scan_angle: point.scan_angle,
                user_data: point.user_data,
                point_source_id: point.point_source_id,
                gps_time: point.gps_time,
                color: point.color.map(|c| [c.red, c.green, c.blue]),
            },
        }
    }
}

/// Integer bounding box of a tile's points, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl TileBounds {
    /// Number of coordinate units covered along X, or `None` past `u64::MAX`.
    pub fn width(&self) -> Option<u64> {
        span(self.min_x, self.max_x)
    }

    /// Number of coordinate units covered along Y, or `None` past `u64::MAX`.
    pub fn height(&self) -> Option<u64> {
        span(self.min_y, self.max_y)
    }

    fn include(&mut self, x: i64, y: i64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

fn span(min: i64, max: i64) -> Option<u64> {
    u64::try_from(i128::from(max) - i128::from(min) + 1).ok()
}

/// All points of one tile in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloudTile {
    points: Vec<PointRecord>,
    bounds: Option<TileBounds>,
}

impl PointCloudTile {
    pub fn new(points: Vec<PointRecord>) -> Self {
        let mut bounds: Option<TileBounds> = None;
        for p in &points {
            match bounds.as_mut() {
                Some(b) => b.include(p.x, p.y),
                None => {
                    bounds = Some(TileBounds {
                        min_x: p.x,
                        min_y: p.y,
                        max_x: p.x,
                        max_y: p.y,
                    })
                }
            }
        }
        Self { points, bounds }
    }

    /// Decode a LAS or LAZ file.
    ///
    /// Fails on unreadable headers, malformed point records, and files that
    /// hold fewer points than their header declares.
    pub fn read(path: impl AsRef<Path>) -> DecodeResult<Self> {
        let path = path.as_ref();
        let mut reader = Reader::from_path(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let expected = reader.header().number_of_points();

        let mut points = Vec::with_capacity(expected.min(1 << 24) as usize);
        for (index, point) in reader.points().enumerate() {
            let point = point.map_err(|source| DecodeError::Point {
                path: path.to_path_buf(),
                index: index as u64,
                source,
            })?;
            points.push(PointRecord::from(&point));
        }

        let actual = points.len() as u64;
        if actual != expected {
            return Err(DecodeError::Truncated {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }

        Ok(Self::new(points))
    }

    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box, `None` for a tile without points.
    pub fn bounds(&self) -> Option<TileBounds> {
        self.bounds
    }
}
