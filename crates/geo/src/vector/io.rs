//! Low level functions to work with gdal vector datasets

use std::path::{Path, PathBuf};

use gdal::{
    Dataset, DatasetOptions, DriverManager, GdalOpenFlags,
    errors::GdalError,
    vector::{Geometry, LayerAccess},
};

use crate::{Error, Extent, Result, vector::VectorFormat};

pub mod dataset {
    use super::*;

    fn open_with_options(path: &Path, options: DatasetOptions) -> Result<Dataset> {
        Dataset::open_ex(path, options).map_err(|err| match err {
            // Match on the error to give a cleaner error message when the file does not exist
            GdalError::NullPointer { method_name: _, msg: _ } => {
                let vec_type = VectorFormat::guess_from_path(path);
                if vec_type != VectorFormat::Unknown && DriverManager::get_driver_by_name(vec_type.gdal_driver_name()).is_err() {
                    return Error::Runtime(format!("Gdal driver not supported: {}", vec_type.gdal_driver_name()));
                }

                Error::InvalidPath(PathBuf::from(path))
            }
            _ => Error::Runtime(format!("Failed to open vector dataset: {} ({})", path.to_string_lossy(), err)),
        })
    }

    /// Open a GDAL vector dataset for reading
    pub fn open_read_only(path: &Path) -> Result<Dataset> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_VECTOR,
            ..Default::default()
        };

        open_with_options(path, options)
    }
}

/// The geometries of all the features in the first layer, features without geometry are skipped
pub fn read_geometries(path: &Path) -> Result<Vec<Geometry>> {
    let ds = dataset::open_read_only(path)?;
    let mut layer = ds.layer(0)?;

    let geometries: Vec<Geometry> = layer.features().filter_map(|feature| feature.geometry().cloned()).collect();
    if geometries.is_empty() {
        return Err(Error::InvalidArgument(format!("No geometries found in {}", path.display())));
    }

    log::debug!("Read {} geometries from {}", geometries.len(), path.display());
    Ok(geometries)
}

/// The bounding box `(xmin, ymin, xmax, ymax)` of the first layer
pub fn vector_extent(path: &Path) -> Result<Extent> {
    let ds = dataset::open_read_only(path)?;
    let layer = ds.layer(0)?;
    let envelope = layer.get_extent()?;

    Ok(Extent {
        xmin: envelope.MinX,
        ymin: envelope.MinY,
        xmax: envelope.MaxX,
        ymax: envelope.MaxY,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::testutils;

    #[test]
    fn open_missing_vector() {
        let path = PathBuf::from("/this/does/not/exist.gpkg");
        assert!(matches!(dataset::open_read_only(&path), Err(Error::InvalidPath(p)) if p == path));
    }

    #[test]
    fn extent_of_polygon_layer() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("aoi.gpkg");
        testutils::write_polygons(
            &path,
            &[
                "POLYGON ((10 20, 30 20, 30 40, 10 40, 10 20))",
                "POLYGON ((25 35, 50 35, 50 45, 25 45, 25 35))",
            ],
        )?;

        assert_relative_eq!(
            vector_extent(&path)?,
            Extent {
                xmin: 10.0,
                ymin: 20.0,
                xmax: 50.0,
                ymax: 45.0,
            }
        );

        assert_eq!(read_geometries(&path)?.len(), 2);
        Ok(())
    }
}
