use std::path::Path;

use geo::raster::{BlockPlan, RasterDataset};
use inf::progressinfo::ProgressNotification;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCount {
    pub npix: u64,
    /// Area of the pixels in ha
    pub area: f64,
}

/// Counts the pixels of the first band that are equal to `value`
pub fn countpix(raster: &Path, value: f64, blk_rows: usize, progress: &mut impl ProgressNotification) -> Result<PixelCount> {
    let ds = RasterDataset::open_read_only(raster)?;
    let geo_transform = ds.geo_transform()?;
    let plan = BlockPlan::for_dataset(&ds, blk_rows)?;

    let mut npix = 0;
    progress.reset("Count pixels", plan.nblock as u64);
    for block in plan.blocks() {
        let data = ds.read_block::<f64>(1, &block)?;
        npix += data.iter().filter(|&&v| v == value).count() as u64;
        progress.tick(block.index as u64 + 1);
    }
    progress.done();

    let area = geo_transform.pixel_area() * npix as f64 / 10000.0;
    log::debug!("{npix} pixels with value {value} in {} ({area} ha)", raster.display());

    Ok(PixelCount { npix, area })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::{RasterSize, testutils};
    use inf::progressinfo::SilentProgress;

    use super::*;

    #[test]
    fn count_forest_pixels() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("forest.tif");
        #[rustfmt::skip]
        let data: [u8; 12] = [
            1, 1, 0, 255,
            0, 1, 1, 255,
            1, 0, 0, 0,
        ];
        testutils::write_raster(&path, RasterSize::with_rows_cols(3, 4), &data, Some(255.0))?;

        let forest = countpix(&path, 1.0, 1, &mut SilentProgress)?;
        assert_eq!(forest.npix, 5);
        // 100 m pixels
        assert_relative_eq!(forest.area, 5.0);

        assert_eq!(countpix(&path, 0.0, 0, &mut SilentProgress)?.npix, 5);
        assert_eq!(countpix(&path, 2.0, 2, &mut SilentProgress)?.npix, 0);
        Ok(())
    }
}
