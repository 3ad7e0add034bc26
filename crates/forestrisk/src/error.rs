use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No {stratum} pixels found in {path}")]
    EmptyStratum { stratum: &'static str, path: PathBuf },
    #[error("Invalid forest mask value {value} at pixel ({col}, {row}) in {path}, expected 0 (deforested) or 1 (forest)")]
    InvalidForestMask { path: PathBuf, value: f64, col: usize, row: usize },
    #[error("No covariate rasters (*.tif) found in {0}")]
    NoCovariates(PathBuf),
    #[error("Expected deforestation is zero (sum of nfor * rate_mod), the rates can not be calibrated")]
    ZeroExpectedDeforestation,
    #[error("Deforestation target of {target} ha exceeds the forest area of {max} ha")]
    TargetExceedsForest { target: f64, max: f64 },
    #[error("Invalid rate table {path}: {msg}")]
    InvalidRateTable { path: PathBuf, msg: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Geo(#[from] geo::Error),
    #[error(transparent)]
    Inf(#[from] inf::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl From<gdal::errors::GdalError> for Error {
    fn from(err: gdal::errors::GdalError) -> Self {
        Error::Geo(geo::Error::from(err))
    }
}
