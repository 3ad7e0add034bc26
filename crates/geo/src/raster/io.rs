//! Window based access to GDAL raster datasets.
//!
//! The algorithms never load a full band, every read and write goes through a window
//! that is typically obtained from a [`crate::raster::BlockPlan`].

use std::path::{Path, PathBuf};

use gdal::{
    errors::GdalError,
    raster::{Buffer, GdalDataType, GdalType},
};

use crate::{
    Error, GeoTransform, RasterSize, Result,
    gdalinterop::{create_output_directory_if_needed, create_string_list},
    raster::{Block, GeoTiffWriteOptions},
};

/// Georeferencing information of a raster dataset
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub size: RasterSize,
    pub geo_transform: GeoTransform,
    pub projection: String,
    pub band_count: usize,
    /// The nodata value of the first band
    pub nodata: Option<f64>,
}

/// Nodata value of a band, pixel values are compared with it in the precision of the band data type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nodata {
    value: f64,
    single_precision: bool,
}

impl Nodata {
    pub fn new(value: f64, data_type: GdalDataType) -> Self {
        Nodata {
            value,
            single_precision: data_type == GdalDataType::Float32,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// True when the pixel value (read as f64) is the nodata value
    pub fn matches(&self, value: f64) -> bool {
        if self.value.is_nan() {
            value.is_nan()
        } else if self.single_precision {
            value as f32 == self.value as f32
        } else {
            value == self.value
        }
    }
}

/// Owned handle to an open GDAL raster, the dataset is closed when the handle is dropped
pub struct RasterDataset {
    path: PathBuf,
    ds: gdal::Dataset,
}

impl RasterDataset {
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_flags(path.as_ref(), gdal::GdalOpenFlags::GDAL_OF_READONLY)
    }

    fn open_with_flags(path: &Path, flags: gdal::GdalOpenFlags) -> Result<Self> {
        let options = gdal::DatasetOptions {
            open_flags: flags | gdal::GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };

        let ds = gdal::Dataset::open_ex(path, options).map_err(|err| open_error(path, err))?;
        Ok(RasterDataset {
            path: path.to_path_buf(),
            ds,
        })
    }

    pub(crate) fn from_dataset(path: PathBuf, ds: gdal::Dataset) -> Self {
        RasterDataset { path, ds }
    }

    /// Creates a new single band GeoTIFF on the same grid as `like`.
    ///
    /// An existing file at the destination is removed first.
    pub fn create_like<T: GdalType>(
        path: impl AsRef<Path>,
        like: &RasterMetadata,
        nodata: Option<f64>,
        options: &GeoTiffWriteOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        create_output_directory_if_needed(path)?;
        inf::fs::remove_file_if_exists(path)?;

        let driver = gdal::DriverManager::get_driver_by_name("GTiff")?;
        let creation_options = create_string_list(&options.to_creation_options())?;
        let mut ds = driver.create_with_band_type_with_options::<T, _>(path, like.size.cols, like.size.rows, 1, &creation_options)?;
        ds.set_geo_transform(&like.geo_transform.coefficients())?;
        if !like.projection.is_empty() {
            ds.set_projection(&like.projection)?;
        }
        ds.rasterband(1)?.set_no_data_value(nodata)?;

        Ok(RasterDataset {
            path: path.to_path_buf(),
            ds,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self) -> &gdal::Dataset {
        &self.ds
    }

    pub fn raster_size(&self) -> RasterSize {
        let (cols, rows) = self.ds.raster_size();
        RasterSize::with_rows_cols(rows, cols)
    }

    pub fn band_count(&self) -> usize {
        self.ds.raster_count()
    }

    pub fn geo_transform(&self) -> Result<GeoTransform> {
        Ok(GeoTransform::new(self.ds.geo_transform()?))
    }

    /// The nodata value of the band (1-based index)
    pub fn nodata(&self, band: usize) -> Result<Option<f64>> {
        Ok(self.ds.rasterband(band)?.no_data_value())
    }

    /// The nodata value of the band (1-based index) bound to the band data type
    pub fn band_nodata(&self, band: usize) -> Result<Option<Nodata>> {
        let band = self.ds.rasterband(band)?;
        Ok(band.no_data_value().map(|value| Nodata::new(value, band.band_type())))
    }

    pub fn metadata(&self) -> Result<RasterMetadata> {
        let band_count = self.band_count();
        Ok(RasterMetadata {
            size: self.raster_size(),
            geo_transform: self.geo_transform()?,
            projection: self.ds.projection(),
            band_count,
            nodata: if band_count > 0 { self.nodata(1)? } else { None },
        })
    }

    /// The native (cols, rows) block size of the band
    pub fn block_size(&self, band: usize) -> Result<(usize, usize)> {
        Ok(self.ds.rasterband(band)?.block_size())
    }

    /// Reads the window of the block in a row-major buffer, converted to `T`
    pub fn read_block<T: GdalType + Copy>(&self, band: usize, block: &Block) -> Result<Vec<T>> {
        self.read_window(band, block.x, block.y, block.nx, block.ny)
    }

    /// Reads a `nx` x `ny` window with its top left pixel at (`x`, `y`) in a row-major buffer
    pub fn read_window<T: GdalType + Copy>(&self, band: usize, x: usize, y: usize, nx: usize, ny: usize) -> Result<Vec<T>> {
        self.check_window(x, y, nx, ny)?;
        let buffer = self
            .ds
            .rasterband(band)?
            .read_as::<T>((x as isize, y as isize), (nx, ny), (nx, ny), None)?;
        let (_shape, data) = buffer.into_shape_and_vec();
        Ok(data)
    }

    /// Writes a row-major buffer in the window with its top left pixel at (`x`, `y`)
    pub fn write_window<T: GdalType + Copy>(&mut self, band: usize, data: Vec<T>, x: usize, y: usize, nx: usize, ny: usize) -> Result {
        if data.len() != nx * ny {
            return Err(Error::SizeMismatch {
                size1: RasterSize::with_rows_cols(ny, nx),
                size2: RasterSize::with_rows_cols(1, data.len()),
            });
        }

        self.check_window(x, y, nx, ny)?;
        let mut buffer = Buffer::new((nx, ny), data);
        self.ds.rasterband(band)?.write((x as isize, y as isize), (nx, ny), &mut buffer)?;
        Ok(())
    }

    pub fn write_block<T: GdalType + Copy>(&mut self, band: usize, block: &Block, data: Vec<T>) -> Result {
        self.write_window(band, data, block.x, block.y, block.nx, block.ny)
    }

    /// Pixel counts for `bins` equally sized bins in the range [`min`, `max`], values outside the range are ignored
    pub fn histogram(&self, band: usize, min: f64, max: f64, bins: usize) -> Result<Vec<u64>> {
        let histogram = self.ds.rasterband(band)?.histogram(min, max, bins, false, false)?;
        Ok(histogram.counts().to_vec())
    }

    /// Computes the exact band statistics, they are stored in the dataset metadata when it is closed
    pub fn compute_statistics(&self, band: usize) -> Result {
        let band = self.ds.rasterband(band)?;
        match band.get_statistics(true, false)? {
            Some(stats) => log::debug!(
                "Statistics of {}: min {} max {} mean {} stddev {}",
                self.path.display(),
                stats.min,
                stats.max,
                stats.mean,
                stats.std_dev
            ),
            None => log::warn!("No statistics available for {}", self.path.display()),
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result {
        self.ds.flush_cache()?;
        Ok(())
    }

    fn check_window(&self, x: usize, y: usize, nx: usize, ny: usize) -> Result {
        let size = self.raster_size();
        if x + nx > size.cols || y + ny > size.rows {
            return Err(Error::InvalidArgument(format!(
                "Window ({x}, {y}) {nx}x{ny} is outside of the raster {} ({size})",
                self.path.display()
            )));
        }

        Ok(())
    }
}

/// Gives a cleaner error message when the file does not exist
fn open_error(path: &Path, err: GdalError) -> Error {
    match err {
        GdalError::NullPointer { .. } if !path.exists() => Error::InvalidPath(path.to_path_buf()),
        _ => Error::Runtime(format!("Failed to open raster dataset: {} ({})", path.to_string_lossy(), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;

    #[test]
    fn open_read_only_invalid_path() {
        let path = PathBuf::from("/this/does/not/exist.tif");
        let res = RasterDataset::open_read_only(path.as_path());
        assert!(matches!(res, Err(Error::InvalidPath(p)) if p == path));
    }

    #[test]
    fn read_and_write_windows() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("values.tif");
        let data: Vec<u8> = (0..20).collect();
        testutils::write_raster(&path, RasterSize::with_rows_cols(4, 5), &data, Some(255.0))?;

        let ds = RasterDataset::open_read_only(&path)?;
        let meta = ds.metadata()?;
        assert_eq!(meta.size, RasterSize::with_rows_cols(4, 5));
        assert_eq!(meta.nodata, Some(255.0));
        assert_eq!(meta.band_count, 1);

        assert_eq!(ds.read_window::<u8>(1, 1, 1, 2, 2)?, vec![6, 7, 11, 12]);
        assert_eq!(ds.read_window::<f64>(1, 4, 3, 1, 1)?, vec![19.0]);
        assert!(ds.read_window::<u8>(1, 4, 3, 2, 1).is_err());

        let out_path = tmp.path().join("sub").join("copy.tif");
        let mut out = RasterDataset::create_like::<f64>(&out_path, &meta, Some(-9999.0), &GeoTiffWriteOptions::default())?;
        out.write_window(1, vec![1.5, 2.5], 0, 0, 2, 1)?;
        assert!(out.write_window(1, vec![1.5, 2.5], 0, 0, 3, 1).is_err());
        out.flush()?;
        drop(out);

        let copy = RasterDataset::open_read_only(&out_path)?;
        assert_eq!(copy.metadata()?.geo_transform, meta.geo_transform);
        assert_eq!(copy.nodata(1)?, Some(-9999.0));
        assert_eq!(copy.read_window::<f64>(1, 0, 0, 2, 1)?, vec![1.5, 2.5]);
        Ok(())
    }

    #[test]
    fn float32_nodata_is_compared_in_single_precision() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("float.tif");
        testutils::write_raster::<f32>(&path, RasterSize::with_rows_cols(1, 2), &[0.1, 0.2], Some(0.1))?;

        let ds = RasterDataset::open_read_only(&path)?;
        let nodata = ds.band_nodata(1)?.expect("nodata");
        let values = ds.read_window::<f64>(1, 0, 0, 2, 1)?;
        assert_ne!(values[0], 0.1);
        assert!(nodata.matches(values[0]));
        assert!(!nodata.matches(values[1]));
        Ok(())
    }

    #[test]
    fn nodata_matching() {
        let double = Nodata::new(0.1, GdalDataType::Float64);
        assert!(double.matches(0.1));
        assert!(!double.matches(0.1f32 as f64));

        let byte = Nodata::new(255.0, GdalDataType::UInt8);
        assert!(byte.matches(255.0));
        assert!(!byte.matches(254.0));

        let nan = Nodata::new(f64::NAN, GdalDataType::Float32);
        assert!(nan.matches(f64::NAN));
        assert!(!nan.matches(0.0));
    }

    #[test]
    fn histogram_counts_integer_bins() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("classes.tif");
        testutils::write_raster::<u16>(&path, RasterSize::with_rows_cols(2, 3), &[0, 1, 1, 3, 3, 3], Some(0.0))?;

        let ds = RasterDataset::open_read_only(&path)?;
        let counts = ds.histogram(1, 0.5, 3.5, 3)?;
        assert_eq!(counts, vec![2, 0, 3]);
        Ok(())
    }
}
