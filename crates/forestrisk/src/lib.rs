#![warn(clippy::unwrap_used)]

//! Sampling and allocation pipeline for jurisdictional deforestation risk.
//!
//! * [`sample`]: balanced sample of deforested and forest pixels with their covariate values
//! * [`allocate_deforestation`]: distribution of a jurisdictional deforestation target over a project area
//! * [`defrate_per_cat`]: class rate table derived from a forest cover change raster and a risk class raster
//! * [`countpix`]: number of pixels with a given value and their area
//!
//! Every raster pass streams the data window by window using a [`geo::raster::BlockPlan`].

pub type Result<T = ()> = std::result::Result<T, Error>;

mod allocate;
mod calibrate;
mod countpix;
mod defrate;
mod error;
mod histogram;
mod ratetable;
mod sample;

pub use allocate::{AllocateOptions, AllocationResult, DENSITY_NODATA, allocate_deforestation, write_density_raster};
pub use calibrate::{CalibratedRate, calibrate_rates, write_calibrated_rates};
pub use countpix::{PixelCount, countpix};
pub use defrate::{ClassDefrate, DefratePerCatOptions, Period, class_rate_mod, defrate_per_cat};
#[doc(inline)]
pub use error::Error;
pub use histogram::{HistogramStrategy, RISK_CLASS_COUNT, RiskHistogram, risk_histogram};
pub use ratetable::{ClassRate, RateTable, read_rate_table};
pub use sample::{CSIZE_FILE_NAME, SampleOptions, SamplePoint, SampleTable, adaptive_sample_size, cell_grid::CellGrid, sample};
