//! Number of pixels per risk class within a project area.

use std::path::{Path, PathBuf};

use geo::{
    RasterSize,
    raster::{BlockPlan, RasterDataset, algo},
    vector,
};
use inf::progressinfo::ProgressNotification;

use crate::{Error, Result};

/// Risk classes are in the range [1, 65535], 0 is reserved for nodata
pub const RISK_CLASS_COUNT: usize = 65535;

const HISTOGRAM_MIN: f64 = 0.5;
const HISTOGRAM_MAX: f64 = RISK_CLASS_COUNT as f64 + 0.5;

/// How the pixels within the project polygon are selected
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistogramStrategy {
    /// Rasterizes the polygon (all touched) on the grid of the risk raster and counts the pixels under it
    #[default]
    InMemory,
    /// Crops the risk raster to the polygon with gdalwarp (all touched) in the provided file and histograms the result
    Warp { cropped_raster: PathBuf },
}

/// Pixel count per risk class, classes without pixels are included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskHistogram {
    counts: Vec<u64>,
}

impl RiskHistogram {
    pub(crate) fn from_counts(counts: Vec<u64>) -> Result<Self> {
        if counts.len() != RISK_CLASS_COUNT {
            return Err(Error::InvalidArgument(format!(
                "Expected {RISK_CLASS_COUNT} histogram bins, got {}",
                counts.len()
            )));
        }

        Ok(RiskHistogram { counts })
    }

    /// The number of pixels of the class, 0 for classes outside of the valid range
    pub fn count(&self, cat: u32) -> u64 {
        match cat {
            0 => 0,
            cat => self.counts.get(cat as usize - 1).copied().unwrap_or(0),
        }
    }

    /// Iterates over (cat, count) for all the classes
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.counts.iter().enumerate().map(|(i, &count)| (i as u32 + 1, count))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// The histogram bin of the value, `None` for values outside of the class range
fn class_bin(value: f64) -> Option<usize> {
    if (HISTOGRAM_MIN..=HISTOGRAM_MAX).contains(&value) {
        Some(((value - HISTOGRAM_MIN).floor() as usize).min(RISK_CLASS_COUNT - 1))
    } else {
        None
    }
}

/// Counts the pixels of the risk raster per class within the polygons of the project vector
pub fn risk_histogram(
    riskmap: &Path,
    project_borders: &Path,
    strategy: &HistogramStrategy,
    blk_rows: usize,
    progress: &mut impl ProgressNotification,
) -> Result<RiskHistogram> {
    match strategy {
        HistogramStrategy::InMemory => masked_histogram(riskmap, project_borders, blk_rows, progress),
        HistogramStrategy::Warp { cropped_raster } => {
            algo::crop_to_cutline(riskmap, cropped_raster, project_borders)?;
            let ds = RasterDataset::open_read_only(cropped_raster)?;
            RiskHistogram::from_counts(ds.histogram(1, HISTOGRAM_MIN, HISTOGRAM_MAX, RISK_CLASS_COUNT)?)
        }
    }
}

fn masked_histogram(riskmap: &Path, project_borders: &Path, blk_rows: usize, progress: &mut impl ProgressNotification) -> Result<RiskHistogram> {
    let ds = RasterDataset::open_read_only(riskmap)?;
    let meta = ds.metadata()?;
    meta.geo_transform.check_north_up()?;

    let mut counts = vec![0u64; RISK_CLASS_COUNT];

    let geometries = vector::io::read_geometries(project_borders)?;
    let extent = vector::io::vector_extent(project_borders)?;
    let Some((col, row, cols, rows)) = algo::pixel_window(&meta.geo_transform, meta.size, &extent) else {
        log::warn!("The project area {} does not overlap the risk map", project_borders.display());
        return RiskHistogram::from_counts(counts);
    };

    let window_size = RasterSize::with_rows_cols(rows, cols);
    let plan = if blk_rows > 0 {
        BlockPlan::new(window_size, cols, blk_rows)?
    } else {
        let (block_cols, block_rows) = ds.block_size(1)?;
        BlockPlan::new(window_size, block_cols.max(1), block_rows.max(1))?
    };

    let nodata = ds.band_nodata(1)?;
    progress.reset("Compute number of pixels for each class", plan.nblock as u64);
    for block in plan.blocks() {
        let (x, y) = (col + block.x, row + block.y);
        let mask = algo::polygon_mask(
            &geometries,
            &meta.geo_transform.window(x, y),
            RasterSize::with_rows_cols(block.ny, block.nx),
            &meta.projection,
            true,
        )?;

        let data = ds.read_window::<f64>(1, x, y, block.nx, block.ny)?;
        for (offset, value) in data.into_iter().enumerate() {
            if mask[offset] == 0 || nodata.is_some_and(|nodata| nodata.matches(value)) {
                continue;
            }

            if let Some(bin) = class_bin(value) {
                counts[bin] += 1;
            }
        }

        progress.tick(block.index as u64 + 1);
    }
    progress.done();

    RiskHistogram::from_counts(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_are_centered_on_classes() {
        assert_eq!(class_bin(0.0), None);
        assert_eq!(class_bin(1.0), Some(0));
        assert_eq!(class_bin(2.0), Some(1));
        assert_eq!(class_bin(65535.0), Some(65534));
        assert_eq!(class_bin(65536.0), None);
        assert_eq!(class_bin(f64::NAN), None);
    }

    #[test]
    fn histogram_lookup() -> Result {
        let mut counts = vec![0; RISK_CLASS_COUNT];
        counts[0] = 5;
        counts[2] = 2;
        let histogram = RiskHistogram::from_counts(counts)?;
        assert_eq!(histogram.count(0), 0);
        assert_eq!(histogram.count(1), 5);
        assert_eq!(histogram.count(2), 0);
        assert_eq!(histogram.count(3), 2);
        assert_eq!(histogram.count(70000), 0);
        assert_eq!(histogram.total(), 7);
        assert_eq!(histogram.iter().count(), RISK_CLASS_COUNT);
        assert!(RiskHistogram::from_counts(vec![0; 3]).is_err());
        Ok(())
    }
}
