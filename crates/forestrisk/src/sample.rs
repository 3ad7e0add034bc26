//! Stratified sampling of deforested and forest pixels.
//!
//! The forest mask is never loaded in memory: a first pass counts the deforested (0) and forest (1)
//! pixels per block, the requested number of samples is distributed over the blocks proportionally
//! to these counts and a second pass draws the pixels within the selected blocks.
//! The covariate values of the selected pixels are read from a virtual raster stack aligned on the forest mask.

pub mod cell_grid;
mod covariates;

use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use geo::raster::{BlockPlan, Nodata, RasterDataset, RasterMetadata, VirtualStack};
use inf::progressinfo::ProgressNotification;
use rand::{
    SeedableRng,
    distr::{Distribution, weighted::WeightedIndex},
    rngs::StdRng,
    seq::index,
};

use crate::{Error, Result};
use cell_grid::CellGrid;

/// Lower bound of the adaptive sample size
const MIN_ADAPTIVE_SAMPLES: usize = 10000;
/// Upper bound of the adaptive sample size
const MAX_ADAPTIVE_SAMPLES: usize = 50000;

/// File written next to the sample table, containing the spatial cell size in km
pub const CSIZE_FILE_NAME: &str = "csize_icar.txt";

#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Number of pixels to draw in each stratum
    pub nsamp: usize,
    /// Adapt `nsamp` to the forest area: 1000 per Mha, clamped to [10000, 50000]
    pub adapt: bool,
    pub seed: u64,
    /// Size of the spatial cells in km
    pub csize_km: f64,
    /// Directory containing the covariate rasters (`*.tif`)
    pub var_dir: PathBuf,
    /// File name of the forest mask in `var_dir` (1 = forest, 0 = deforested)
    pub forest_raster: PathBuf,
    pub output_file: PathBuf,
    /// Number of rows per block, 0 uses the native block size of the forest raster
    pub blk_rows: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        SampleOptions {
            nsamp: 10000,
            adapt: true,
            seed: 1234,
            csize_km: 10.0,
            var_dir: PathBuf::from("data"),
            forest_raster: PathBuf::from("forest.tif"),
            output_file: PathBuf::from("sample.txt"),
            blk_rows: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stratum {
    Deforested,
    Forest,
}

impl Stratum {
    fn name(&self) -> &'static str {
        match self {
            Stratum::Deforested => "deforested",
            Stratum::Forest => "forest",
        }
    }
}

/// A sampled pixel with its covariate values, `None` for nodata
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    pub col: usize,
    pub row: usize,
    pub x: f64,
    pub y: f64,
    pub cell: u64,
    pub values: Vec<Option<f64>>,
}

/// The sampled pixels: the deforested pixels first, followed by the forest pixels
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    pub covariates: Vec<String>,
    pub points: Vec<SamplePoint>,
    /// The number of deforested pixels at the start of `points`
    pub deforested_count: usize,
    /// The number of samples per stratum that was requested (after adaptation)
    pub nsamp: usize,
}

impl SampleTable {
    /// Header: the covariate names followed by `X`, `Y` and `cell`
    pub fn column_names(&self) -> Vec<String> {
        let mut names = self.covariates.clone();
        names.extend(["X", "Y", "cell"].map(String::from));
        names
    }

    pub fn write_csv(&self, path: &Path) -> Result {
        inf::fs::write_atomically(path, |file| -> Result {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(self.column_names())?;
            for point in &self.points {
                let mut record: Vec<String> = point.values.iter().map(|v| format_value(*v)).collect();
                record.push(format_value(Some(point.x)));
                record.push(format_value(Some(point.y)));
                record.push(point.cell.to_string());
                writer.write_record(&record)?;
            }

            writer.flush()?;
            Ok(())
        })
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:?}"),
        _ => "nan".to_string(),
    }
}

/// The number of samples per stratum for a forest mask with `npix` forest and deforested pixels.
///
/// 1000 samples per Mha of forest, with a minimum of 10000 and a maximum of 50000.
pub fn adaptive_sample_size(pixel_area_m2: f64, npix: u64) -> usize {
    let forest_area_ha = pixel_area_m2 * npix as f64 / 10000.0;
    let nsamp_prop = 1000.0 * forest_area_ha / 1e6;
    if nsamp_prop >= MAX_ADAPTIVE_SAMPLES as f64 {
        MAX_ADAPTIVE_SAMPLES
    } else if nsamp_prop <= MIN_ADAPTIVE_SAMPLES as f64 {
        MIN_ADAPTIVE_SAMPLES
    } else {
        nsamp_prop.round_ties_even() as usize
    }
}

/// Number of deforested and forest pixels per block
#[derive(Debug, Clone, PartialEq, Eq)]
struct StrataCounts {
    deforested: Vec<u64>,
    forest: Vec<u64>,
}

impl StrataCounts {
    fn total(&self, stratum: Stratum) -> u64 {
        self.per_block(stratum).iter().sum()
    }

    fn per_block(&self, stratum: Stratum) -> &[u64] {
        match stratum {
            Stratum::Deforested => &self.deforested,
            Stratum::Forest => &self.forest,
        }
    }
}

struct ForestMask<'a> {
    ds: &'a RasterDataset,
    nodata: Option<Nodata>,
}

impl ForestMask<'_> {
    /// Row-major offsets of the deforested and forest pixels in the block
    fn stratum_offsets(&self, block: &geo::raster::Block) -> Result<(Vec<usize>, Vec<usize>)> {
        let data = self.ds.read_block::<f64>(1, block)?;
        let mut deforested = Vec::new();
        let mut forest = Vec::new();

        for (offset, &value) in data.iter().enumerate() {
            if value == 0.0 {
                deforested.push(offset);
            } else if value == 1.0 {
                forest.push(offset);
            } else if self.nodata.is_none_or(|nodata| !nodata.matches(value)) {
                let (col, row) = block.global_position(offset);
                return Err(Error::InvalidForestMask {
                    path: self.ds.path().to_path_buf(),
                    value,
                    col,
                    row,
                });
            }
        }

        Ok((deforested, forest))
    }
}

fn count_strata(mask: &ForestMask, plan: &BlockPlan, progress: &mut impl ProgressNotification) -> Result<StrataCounts> {
    let mut counts = StrataCounts {
        deforested: vec![0; plan.nblock],
        forest: vec![0; plan.nblock],
    };

    progress.reset("Count deforested and forest pixels per block", plan.nblock as u64);
    for block in plan.blocks() {
        let (deforested, forest) = mask.stratum_offsets(&block)?;
        counts.deforested[block.index] = deforested.len() as u64;
        counts.forest[block.index] = forest.len() as u64;
        progress.tick(block.index as u64 + 1);
    }
    progress.done();

    Ok(counts)
}

/// Draws `nsamp` blocks with replacement, weighted by the number of pixels of the stratum in the block.
/// Returns the number of draws per block.
fn draw_blocks(pixels_per_block: &[u64], nsamp: usize, rng: &mut StdRng) -> Result<Vec<usize>> {
    let dist = WeightedIndex::new(pixels_per_block).map_err(|err| Error::InvalidArgument(format!("Invalid block weights ({err})")))?;

    let mut draws = vec![0; pixels_per_block.len()];
    for _ in 0..nsamp {
        draws[dist.sample(rng)] += 1;
    }

    Ok(draws)
}

/// Selects `count` of the candidates without replacement, all of them when there are not enough
fn draw_pixels(candidates: &[usize], count: usize, rng: &mut StdRng) -> Vec<usize> {
    if count == 0 {
        Vec::new()
    } else if count < candidates.len() {
        index::sample(rng, candidates.len(), count).into_iter().map(|i| candidates[i]).collect()
    } else {
        candidates.to_vec()
    }
}

struct Selection {
    deforested: Vec<(usize, usize)>,
    forest: Vec<(usize, usize)>,
}

fn select_pixels(
    mask: &ForestMask,
    plan: &BlockPlan,
    deforested_draws: &[usize],
    forest_draws: &[usize],
    rng: &mut StdRng,
    progress: &mut impl ProgressNotification,
) -> Result<Selection> {
    let mut selection = Selection {
        deforested: Vec::new(),
        forest: Vec::new(),
    };

    progress.reset("Draw pixels at random in blocks", plan.nblock as u64);
    for block in plan.blocks() {
        let ndraw_d = deforested_draws[block.index];
        let ndraw_f = forest_draws[block.index];
        if ndraw_d > 0 || ndraw_f > 0 {
            let (deforested, forest) = mask.stratum_offsets(&block)?;
            selection
                .deforested
                .extend(draw_pixels(&deforested, ndraw_d, rng).into_iter().map(|offset| block.global_position(offset)));
            selection
                .forest
                .extend(draw_pixels(&forest, ndraw_f, rng).into_iter().map(|offset| block.global_position(offset)));
        }

        progress.tick(block.index as u64 + 1);
    }
    progress.done();

    Ok(selection)
}

fn draw_sample(opts: &SampleOptions, forest_path: &Path, rng: &mut StdRng, progress: &mut impl ProgressNotification) -> Result<(RasterMetadata, usize, Selection)> {
    let ds = RasterDataset::open_read_only(forest_path)?;
    let meta = ds.metadata()?;
    meta.geo_transform.check_north_up()?;

    let plan = BlockPlan::for_dataset(&ds, opts.blk_rows)?;
    log::info!("Divide region in {} blocks", plan.nblock);

    let mask = ForestMask {
        ds: &ds,
        nodata: ds.band_nodata(1)?,
    };
    let counts = count_strata(&mask, &plan, progress)?;

    for stratum in [Stratum::Deforested, Stratum::Forest] {
        if counts.total(stratum) == 0 {
            return Err(Error::EmptyStratum {
                stratum: stratum.name(),
                path: forest_path.to_path_buf(),
            });
        }
    }

    let ndc = counts.total(Stratum::Deforested);
    let nfc = counts.total(Stratum::Forest);
    log::info!("{ndc} deforested and {nfc} forest pixels");

    let nsamp = if opts.adapt {
        adaptive_sample_size(meta.geo_transform.pixel_area(), ndc + nfc)
    } else {
        opts.nsamp
    };
    log::info!("Sample 2x {nsamp} pixels (deforested vs. forest)");

    let deforested_draws = draw_blocks(counts.per_block(Stratum::Deforested), nsamp, rng)?;
    let forest_draws = draw_blocks(counts.per_block(Stratum::Forest), nsamp, rng)?;
    let selection = select_pixels(&mask, &plan, &deforested_draws, &forest_draws, rng, progress)?;

    Ok((meta, nsamp, selection))
}

fn extract_covariates(
    stack: &VirtualStack,
    pixels: impl Iterator<Item = (usize, usize)>,
    grid: &CellGrid,
    meta: &RasterMetadata,
    pixel_count: usize,
    progress: &mut impl ProgressNotification,
) -> Result<Vec<SamplePoint>> {
    let mut points = Vec::with_capacity(pixel_count);

    progress.reset("Extract raster values for selected pixels", pixel_count as u64);
    for (i, (col, row)) in pixels.enumerate() {
        let center = meta.geo_transform.pixel_center(col, row);
        let values = (1..=stack.band_count())
            .map(|band| stack.read_pixel(band, col, row))
            .collect::<geo::Result<Vec<Option<f64>>>>()?;

        points.push(SamplePoint {
            col,
            row,
            x: center.x(),
            y: center.y(),
            cell: grid.cell(center.x(), center.y()),
            values,
        });

        progress.tick(i as u64 + 1);
    }
    progress.done();

    Ok(points)
}

fn write_cell_size(output_file: &Path, csize_km: f64) -> Result {
    let dir = output_file.parent().unwrap_or(Path::new(""));
    let path = dir.join(CSIZE_FILE_NAME);
    inf::fs::write_atomically(&path, |file| -> Result {
        write!(file, "{csize_km:?}")?;
        Ok(())
    })
}

/// Draws `nsamp` deforested and `nsamp` forest pixels and extracts their covariate values.
///
/// The table is written to `opts.output_file` and the spatial cell size to `csize_icar.txt` in the same directory.
/// Given the same inputs and seed the output is identical.
pub fn sample(opts: &SampleOptions, progress: &mut impl ProgressNotification) -> Result<SampleTable> {
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let forest_path = opts.var_dir.join(&opts.forest_raster);
    let covariates = covariates::list_covariates(&opts.var_dir)?;

    // The forest mask is closed before the virtual stack is created
    let (meta, nsamp, selection) = draw_sample(opts, &forest_path, &mut rng, progress)?;

    let gt = meta.geo_transform;
    let extent = gt.extent(meta.size.cols, meta.size.rows);
    let grid = CellGrid::new(&extent, opts.csize_km)?;
    log::info!(
        "Compute number of {0} x {0} km spatial cells: {1} cells ({2} x {3})",
        opts.csize_km,
        grid.cell_count(),
        grid.rows(),
        grid.columns()
    );

    log::info!("Make virtual raster with {} variables as raster bands", covariates.len());
    let sources: Vec<PathBuf> = covariates.iter().map(|c| c.path.clone()).collect();
    let stack = VirtualStack::build(&sources, extent, gt.cell_size_x(), gt.cell_size_y())?;

    let pixel_count = selection.deforested.len() + selection.forest.len();
    let pixels = selection.deforested.iter().chain(selection.forest.iter()).copied();
    let points = extract_covariates(&stack, pixels, &grid, &meta, pixel_count, progress)?;
    drop(stack);

    let table = SampleTable {
        covariates: covariates.into_iter().map(|c| c.name).collect(),
        points,
        deforested_count: selection.deforested.len(),
        nsamp,
    };

    log::info!("Export results to file {}", opts.output_file.display());
    table.write_csv(&opts.output_file)?;
    write_cell_size(&opts.output_file, opts.csize_km)?;

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_sample_size_clamps() {
        // 30m pixels: 900 m2
        let pixels_per_mha = 1e6 * 10000.0 / 900.0;
        assert_eq!(adaptive_sample_size(900.0, (0.5 * pixels_per_mha) as u64), MIN_ADAPTIVE_SAMPLES);
        assert_eq!(adaptive_sample_size(900.0, (100.0 * pixels_per_mha) as u64), MAX_ADAPTIVE_SAMPLES);
        assert_eq!(adaptive_sample_size(900.0, 0), MIN_ADAPTIVE_SAMPLES);
        // 25 Mha of 100m pixels
        assert_eq!(adaptive_sample_size(10000.0, 25_000_000), 25000);
    }

    #[test]
    fn adaptive_sample_size_rounds_half_to_even() {
        // 1 ha pixels: 1000 samples per 1e6 pixels, 12.5 Mha gives 12500 exactly
        assert_eq!(adaptive_sample_size(10000.0, 12_500_000), 12500);
        // 12.0005 Mha -> 12000.5 -> 12000
        assert_eq!(adaptive_sample_size(10000.0, 12_000_500), 12000);
        // 12.0015 Mha -> 12001.5 -> 12002
        assert_eq!(adaptive_sample_size(10000.0, 12_001_500), 12002);
    }

    #[test]
    fn block_draws_follow_weights() -> Result {
        let mut rng = StdRng::seed_from_u64(1234);
        let draws = draw_blocks(&[0, 10, 0, 5], 1000, &mut rng)?;
        assert_eq!(draws.iter().sum::<usize>(), 1000);
        assert_eq!(draws[0], 0);
        assert_eq!(draws[2], 0);
        assert!(draws[1] > draws[3]);

        assert!(draw_blocks(&[0, 0], 10, &mut rng).is_err());
        Ok(())
    }

    #[test]
    fn pixel_draws_without_replacement() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates: Vec<usize> = (100..120).collect();

        let mut selected = draw_pixels(&candidates, 5, &mut rng);
        assert_eq!(selected.len(), 5);
        selected.sort_unstable();
        selected.dedup();
        assert_eq!(selected.len(), 5);
        assert!(selected.iter().all(|offset| candidates.contains(offset)));

        assert_eq!(draw_pixels(&candidates, 20, &mut rng), candidates);
        assert_eq!(draw_pixels(&candidates, 50, &mut rng), candidates);
        assert!(draw_pixels(&candidates, 0, &mut rng).is_empty());
    }

    #[test]
    fn same_seed_same_draws() -> Result {
        let weights = [3, 0, 7, 1, 9];
        let first = draw_blocks(&weights, 100, &mut StdRng::seed_from_u64(7))?;
        let second = draw_blocks(&weights, 100, &mut StdRng::seed_from_u64(7))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(Some(10.0)), "10.0");
        assert_eq!(format_value(Some(0.25)), "0.25");
        assert_eq!(format_value(Some(-3.5)), "-3.5");
        assert_eq!(format_value(None), "nan");
        assert_eq!(format_value(Some(f64::NAN)), "nan");
    }
}
