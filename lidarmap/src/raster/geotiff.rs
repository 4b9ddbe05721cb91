//! GeoTIFF writer.
//!
//! Rasters are Deflate-compressed and carry a GeoKey directory naming the
//! projected CRS by EPSG code. North-up grids use the tiepoint/pixel-scale
//! pair; grids whose rows run northward use a full model transformation,
//! since pixel-scale cannot express a negative row step.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tiff::encoder::colortype::{Gray8, RGBA8};
use tiff::encoder::compression::Deflate;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;

use super::{Grid, RasterArtifact, RasterError, RasterResult};
use crate::tile::part_path;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const PROJECTED_CS_TYPE: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Write `artifact` to `path`.
///
/// The file is produced under a `.part` name and renamed into place, so
/// `path` either holds a complete raster or does not exist.
pub fn write_geotiff(artifact: &RasterArtifact, path: &Path) -> RasterResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RasterError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let part = part_path(path);
    if let Err(e) = encode_to(artifact, &part) {
        fs::remove_file(&part).ok();
        return Err(e);
    }

    fs::rename(&part, path).map_err(|source| RasterError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn encode_to(artifact: &RasterArtifact, path: &Path) -> RasterResult<()> {
    let io_err = |source| RasterError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        let (width, height) = (artifact.width(), artifact.height());
        match &artifact.grid {
            Grid::Rgba(img) => {
                let mut image = encoder.new_image_with_compression::<RGBA8, _>(
                    width,
                    height,
                    Deflate::default(),
                )?;
                write_geo_tags(image.encoder(), artifact)?;
                image.write_data(img.as_raw())?;
            }
            Grid::Gray(img) => {
                let mut image = encoder.new_image_with_compression::<Gray8, _>(
                    width,
                    height,
                    Deflate::default(),
                )?;
                write_geo_tags(image.encoder(), artifact)?;
                image.write_data(img.as_raw())?;
            }
        }
    }

    writer.flush().map_err(io_err)?;
    Ok(())
}

fn write_geo_tags<W, K>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    artifact: &RasterArtifact,
) -> RasterResult<()>
where
    W: std::io::Write + std::io::Seek,
    K: TiffKind,
{
    let t = &artifact.transform;
    if t.is_north_up() {
        dir.write_tag(
            Tag::ModelPixelScaleTag,
            &[t.pixel_width, t.pixel_height, 0.0][..],
        )?;
        dir.write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..],
        )?;
    } else {
        let [x0, dx, _, y0, _, dy] = t.affine();
        #[rustfmt::skip]
        let matrix = [
            dx,  0.0, 0.0, x0,
            0.0, dy,  0.0, y0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, &matrix[..])?;
    }

    #[rustfmt::skip]
    let keys: [u16; 16] = [
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        PROJECTED_CS_TYPE, 0, 1, artifact.epsg,
    ];
    dir.write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;

    if let Some(nodata) = artifact.nodata {
        dir.write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }
    Ok(())
}
