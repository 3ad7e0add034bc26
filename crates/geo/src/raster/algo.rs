//! Algorithms for raster data processing (warp, rasterize).

mod gdalwarp;
mod rasterize;

pub use gdalwarp::{crop_to_cutline, warp_to_disk_cli};
pub use rasterize::{pixel_window, polygon_mask};
