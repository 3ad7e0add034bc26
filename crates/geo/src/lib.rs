#![warn(clippy::unwrap_used)]

//! Raster and vector access layer on top of GDAL.
//!
//! Rasters are processed window by window using a [`raster::BlockPlan`], the full band is never loaded in memory.

pub type Result<T = ()> = std::result::Result<T, Error>;

mod error;
pub mod gdalinterop;
mod geotransform;
pub mod raster;
mod rastersize;
mod runtimeconfiguration;
pub mod vector;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use geotransform::{Extent, GeoTransform};
#[doc(inline)]
pub use rastersize::RasterSize;
pub use runtimeconfiguration::RuntimeConfiguration;

pub type Point<T = f64> = geo_types::Point<T>;
