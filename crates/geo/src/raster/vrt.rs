//! Virtual multi-band stacks of single band rasters, built with GDALBuildVRT in GDAL's in-memory filesystem.

use std::{
    ffi::{CString, c_char, c_int},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use gdal::cpl::CslStringList;

use crate::{
    Error, Extent, Result,
    gdalinterop::{self, check_pointer},
    raster::{Nodata, RasterDataset},
};

static VRT_COUNTER: AtomicUsize = AtomicUsize::new(0);

struct BuildVrtOptionsWrapper {
    options: *mut gdal_sys::GDALBuildVRTOptions,
}

impl BuildVrtOptionsWrapper {
    fn new(opts: &[String]) -> Result<Self> {
        let c_opts = gdalinterop::create_string_list(opts)?;
        let options = unsafe { gdal_sys::GDALBuildVRTOptionsNew(c_opts.as_ptr(), core::ptr::null_mut()) };
        if options.is_null() {
            return Err(Error::InvalidArgument(format!("Invalid GDALBuildVRT options: {}", opts.join(" "))));
        }

        Ok(BuildVrtOptionsWrapper { options })
    }
}

impl Drop for BuildVrtOptionsWrapper {
    fn drop(&mut self) {
        unsafe {
            gdal_sys::GDALBuildVRTOptionsFree(self.options);
        }
    }
}

/// Removes the file from the GDAL in-memory filesystem when dropped
struct VsiMemFile {
    path: CString,
}

impl Drop for VsiMemFile {
    fn drop(&mut self) {
        if unsafe { gdal_sys::VSIUnlink(self.path.as_ptr()) } != 0 {
            log::debug!("Failed to unlink {}", self.path.to_string_lossy());
        }
    }
}

/// One band per source raster, resampled (nearest neighbour) on a common grid.
///
/// The source nodata values are validated upfront: every source must declare one.
pub struct VirtualStack {
    // Declaration order matters: the dataset has to be closed before the in-memory file is unlinked
    raster: RasterDataset,
    _file: VsiMemFile,
    nodata: Vec<Nodata>,
}

impl VirtualStack {
    /// Stacks the rasters as separate bands on the grid defined by the extent and resolution
    pub fn build(sources: &[PathBuf], extent: Extent, xres: f64, yres: f64) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::InvalidArgument("No rasters provided to build a virtual stack".to_string()));
        }

        let nodata = sources.iter().map(|path| source_nodata(path)).collect::<Result<Vec<Nodata>>>()?;

        let vsi_path = format!(
            "/vsimem/stack_{}_{}.vrt",
            std::process::id(),
            VRT_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let options = BuildVrtOptionsWrapper::new(&[
            "-separate".to_string(),
            "-resolution".to_string(),
            "user".to_string(),
            "-tr".to_string(),
            xres.abs().to_string(),
            yres.abs().to_string(),
            "-te".to_string(),
            extent.xmin.to_string(),
            extent.ymin.to_string(),
            extent.xmax.to_string(),
            extent.ymax.to_string(),
            "-r".to_string(),
            "nearest".to_string(),
        ])?;

        let mut source_names = CslStringList::new();
        for path in sources {
            source_names.add_string(&path.to_string_lossy())?;
        }

        let file = VsiMemFile {
            path: CString::new(vsi_path.as_str())?,
        };

        let ds = unsafe {
            let mut usage_error: c_int = 0;
            let handle = gdal_sys::GDALBuildVRT(
                file.path.as_ptr(),
                sources.len() as c_int,
                std::ptr::null_mut(),
                source_names.as_ptr() as *const *const c_char,
                options.options,
                &mut usage_error,
            );

            if usage_error != 0 {
                return Err(Error::Runtime("GDALBuildVRT: invalid arguments".to_string()));
            }

            gdal::Dataset::from_c_dataset(check_pointer(handle, "GDALBuildVRT")?)
        };

        log::debug!("Built virtual stack {vsi_path} of {} rasters", sources.len());

        Ok(VirtualStack {
            raster: RasterDataset::from_dataset(PathBuf::from(vsi_path), ds),
            _file: file,
            nodata,
        })
    }

    pub fn raster(&self) -> &RasterDataset {
        &self.raster
    }

    pub fn band_count(&self) -> usize {
        self.nodata.len()
    }

    /// The nodata value of the band (1-based)
    pub fn nodata(&self, band: usize) -> Option<Nodata> {
        self.nodata.get(band.wrapping_sub(1)).copied()
    }

    /// Reads the value of a single pixel, `None` when it matches the nodata value of the band
    pub fn read_pixel(&self, band: usize, col: usize, row: usize) -> Result<Option<f64>> {
        let value = self.raster.read_window::<f64>(band, col, row, 1, 1)?;
        Ok(value
            .first()
            .copied()
            .filter(|&v| self.nodata(band).is_none_or(|nodata| !nodata.matches(v))))
    }
}

fn source_nodata(path: &Path) -> Result<Nodata> {
    let ds = RasterDataset::open_read_only(path)?;
    ds.band_nodata(1)?
        .ok_or_else(|| Error::InvalidArgument(format!("Raster band has no nodata value: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoTransform, RasterSize, testutils};

    #[test_log::test]
    fn stack_rasters_as_bands() -> Result {
        let tmp = tempfile::tempdir()?;
        let size = RasterSize::with_rows_cols(3, 4);
        let a = tmp.path().join("a.tif");
        let b = tmp.path().join("b.tif");
        testutils::write_raster::<i16>(&a, size, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, -1], Some(-1.0))?;
        testutils::write_raster::<f32>(&b, size, &[0.5; 12], Some(-9999.0))?;

        let gt = GeoTransform::new(testutils::GEO_TRANSFORM);
        let stack = VirtualStack::build(&[a, b], gt.extent(4, 3), gt.cell_size_x(), gt.cell_size_y())?;
        assert_eq!(stack.band_count(), 2);
        assert_eq!(stack.raster().raster_size(), size);
        assert_eq!(stack.nodata(1).map(|nodata| nodata.value()), Some(-1.0));

        assert_eq!(stack.read_pixel(1, 1, 1)?, Some(6.0));
        assert_eq!(stack.read_pixel(1, 3, 2)?, None);
        assert_eq!(stack.read_pixel(2, 3, 2)?, Some(0.5));
        Ok(())
    }

    #[test_log::test]
    fn float32_nodata_band() -> Result {
        let tmp = tempfile::tempdir()?;
        let size = RasterSize::with_rows_cols(2, 2);
        let path = tmp.path().join("float.tif");
        testutils::write_raster::<f32>(&path, size, &[0.1, 0.1, 0.1, 0.3], Some(0.1))?;

        let gt = GeoTransform::new(testutils::GEO_TRANSFORM);
        let stack = VirtualStack::build(std::slice::from_ref(&path), gt.extent(2, 2), gt.cell_size_x(), gt.cell_size_y())?;
        assert_eq!(stack.read_pixel(1, 0, 0)?, None);
        assert_eq!(stack.read_pixel(1, 1, 0)?, None);
        assert_eq!(stack.read_pixel(1, 1, 1)?, Some(0.3f32 as f64));
        Ok(())
    }

    #[test]
    fn band_without_nodata_is_rejected() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("nonodata.tif");
        testutils::write_raster::<u8>(&path, RasterSize::square(2), &[1, 2, 3, 4], None)?;

        let gt = GeoTransform::new(testutils::GEO_TRANSFORM);
        match VirtualStack::build(std::slice::from_ref(&path), gt.extent(2, 2), gt.cell_size_x(), gt.cell_size_y()) {
            Err(Error::InvalidArgument(msg)) => assert!(msg.contains("nonodata.tif")),
            _ => panic!("Expected an invalid argument error"),
        }

        Ok(())
    }

    #[test]
    fn in_memory_file_is_removed_on_drop() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("a.tif");
        testutils::write_raster::<u8>(&path, RasterSize::square(2), &[1, 2, 3, 4], Some(0.0))?;

        let gt = GeoTransform::new(testutils::GEO_TRANSFORM);
        let stack = VirtualStack::build(std::slice::from_ref(&path), gt.extent(2, 2), gt.cell_size_x(), gt.cell_size_y())?;
        let vsi_path = stack.raster().path().to_path_buf();
        assert!(vsi_path.starts_with("/vsimem"));
        assert_eq!(stack.read_pixel(1, 1, 1)?, Some(4.0));
        drop(stack);
        assert!(RasterDataset::open_read_only(&vsi_path).is_err());
        Ok(())
    }
}
