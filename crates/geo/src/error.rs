use thiserror::Error;

use crate::RasterSize;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Raster dimensions do not match {size1} <-> {size2}")]
    SizeMismatch { size1: RasterSize, size2: RasterSize },
    #[error("Invalid path: {0}")]
    InvalidPath(std::path::PathBuf),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("GDAL error: {0}")]
    GdalError(#[from] gdal::errors::GdalError),
    #[error(transparent)]
    Inf(#[from] inf::Error),
}
