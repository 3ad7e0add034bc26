use std::{
    ffi::{CString, c_int},
    path::Path,
};

use gdal::cpl::CslStringList;

use crate::{Error, Result, gdalinterop, raster::RasterDataset};

struct WarpAppOptionsWrapper {
    options: *mut gdal_sys::GDALWarpAppOptions,
}

impl WarpAppOptionsWrapper {
    fn new(opts: &[String]) -> Result<Self> {
        let mut c_opts = CslStringList::new();
        for opt in opts {
            c_opts.add_string(opt)?;
        }

        let options = unsafe { gdal_sys::GDALWarpAppOptionsNew(c_opts.as_ptr(), core::ptr::null_mut()) };
        if options.is_null() {
            return Err(Error::InvalidArgument(format!("Invalid GDALWarp options: {}", opts.join(" "))));
        }

        Ok(WarpAppOptionsWrapper { options })
    }

    fn set_warp_options(&mut self, key_value_options: &[(String, String)]) -> Result<()> {
        for (key, value) in key_value_options {
            let key = CString::new(key.as_str())?;
            let val = CString::new(value.as_str())?;
            unsafe {
                gdal_sys::GDALWarpAppOptionsSetWarpOption(self.options, key.as_ptr(), val.as_ptr());
            }
        }

        Ok(())
    }
}

impl Drop for WarpAppOptionsWrapper {
    fn drop(&mut self) {
        unsafe {
            gdal_sys::GDALWarpAppOptionsFree(self.options);
        }
    }
}

/// Runs GDALWarp with command line style options, the result is written to `dest_path`
pub fn warp_to_disk_cli(
    src_ds: &gdal::Dataset,
    dest_path: &Path,
    options: &[String],
    key_value_options: &[(String, String)],
) -> Result<()> {
    let mut warp_options = WarpAppOptionsWrapper::new(options)?;
    warp_options.set_warp_options(key_value_options)?;

    gdalinterop::create_output_directory_if_needed(dest_path)?;

    let path_str = CString::new(dest_path.to_string_lossy().to_string())?;

    unsafe {
        let mut user_error: c_int = 0;
        let handle = gdal_sys::GDALWarp(
            path_str.as_ptr(),
            std::ptr::null_mut(),
            1,
            &mut src_ds.c_dataset(),
            warp_options.options,
            &mut user_error,
        );

        if user_error != 0 {
            return Err(Error::Runtime("GDAL Warp: invalid arguments".to_string()));
        }

        // Closes the output dataset, which writes it to disk
        drop(gdal::Dataset::from_c_dataset(gdalinterop::check_pointer(handle, "GDALWarp")?));
    }

    Ok(())
}

/// Crops the raster to the polygons of the cutline vector.
///
/// All pixels touched by the cutline are kept on the original grid, the other pixels inside
/// the cropped extent become nodata. The output is a deflate compressed (Big)GeoTIFF.
pub fn crop_to_cutline(src: &Path, dest: &Path, cutline: &Path) -> Result<()> {
    let src_ds = RasterDataset::open_read_only(src)?;
    if !cutline.exists() {
        return Err(Error::InvalidPath(cutline.to_path_buf()));
    }

    inf::fs::remove_file_if_exists(dest)?;

    let options = [
        "-overwrite",
        "-cutline",
        &cutline.to_string_lossy(),
        "-crop_to_cutline",
        "-co",
        "COMPRESS=DEFLATE",
        "-co",
        "BIGTIFF=YES",
    ]
    .map(String::from);

    let key_value_options = [
        ("CUTLINE_ALL_TOUCHED".to_string(), "TRUE".to_string()),
        ("NUM_THREADS".to_string(), "ALL_CPUS".to_string()),
    ];

    log::debug!("Crop {} to cutline {}", src.display(), cutline.display());
    warp_to_disk_cli(src_ds.dataset(), dest, &options, &key_value_options)
}
