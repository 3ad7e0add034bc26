//! Allocation of a jurisdictional deforestation target to a project area.

use std::path::{Path, PathBuf};

use geo::raster::{BlockPlan, Compression, GeoTiffWriteOptions, Predictor, RasterDataset};
use inf::progressinfo::ProgressNotification;
use serde::Serialize;

use crate::{
    Result,
    calibrate::{CalibratedRate, calibrate_rates, write_calibrated_rates},
    histogram::{HistogramStrategy, RISK_CLASS_COUNT, RiskHistogram, risk_histogram},
    ratetable::read_rate_table,
};

/// Nodata value of the deforestation density raster
pub const DENSITY_NODATA: f64 = -9999.0;

#[derive(Debug, Clone)]
pub struct AllocateOptions {
    /// Risk class raster of the jurisdiction
    pub riskmap: PathBuf,
    /// Class rate table (`cat`, `nfor`, `rate_mod`, `pixel_area`)
    pub rate_table: PathBuf,
    /// Expected deforestation of the jurisdiction over the forecast period in ha
    pub deforestation_ha: f64,
    /// Length of the forecast period in years
    pub horizon_years: f64,
    /// Vector file with the project boundaries
    pub project_borders: PathBuf,
    pub output_file: PathBuf,
    /// The rate table extended with the `rate_abs` and `defor_dens` columns
    pub calibrated_rates: Option<PathBuf>,
    /// Per pixel deforestation density (ha/pixel/yr) of the jurisdiction
    pub density_raster: Option<PathBuf>,
    pub strategy: HistogramStrategy,
    /// Number of rows per block, 0 uses the native block size of the risk raster
    pub blk_rows: usize,
}

impl Default for AllocateOptions {
    fn default() -> Self {
        AllocateOptions {
            riskmap: PathBuf::from("riskmap.tif"),
            rate_table: PathBuf::from("defrate_cat.csv"),
            deforestation_ha: 0.0,
            horizon_years: 10.0,
            project_borders: PathBuf::from("project_boundaries.gpkg"),
            output_file: PathBuf::from("defor_project.csv"),
            calibrated_rates: None,
            density_raster: None,
            strategy: HistogramStrategy::default(),
            blk_rows: 0,
        }
    }
}

/// Expected deforestation of the project
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    /// ha/yr, rounded to 0.1
    pub annual: f64,
    /// ha over the forecast period, rounded to 0.1
    pub entire: f64,
    pub horizon_years: f64,
    /// Classes present in the project area but missing from the rate table
    pub missing_classes: Vec<u32>,
    pub histogram: RiskHistogram,
}

/// Deforestation density per class, indexed by `cat - 1`. NaN for classes without a rate.
fn density_lookup(rates: &[CalibratedRate]) -> Vec<f64> {
    let mut densities = vec![f64::NAN; RISK_CLASS_COUNT];
    for rate in rates {
        densities[rate.cat as usize - 1] = rate.defor_dens;
    }

    densities
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// The annual deforestation (ha/yr) of the pixels in the histogram, classes without density are skipped
fn annual_deforestation(histogram: &RiskHistogram, densities: &[f64]) -> (f64, Vec<u32>) {
    let mut annual = 0.0;
    let mut missing = Vec::new();
    for (cat, count) in histogram.iter().filter(|(_, count)| *count > 0) {
        let density = densities[cat as usize - 1];
        if density.is_nan() {
            missing.push(cat);
        } else {
            annual += count as f64 * density;
        }
    }

    (annual, missing)
}

#[derive(Serialize)]
struct ForecastRecord {
    period: &'static str,
    /// Whole years are written without decimals
    #[serde(rename = "length (yr)")]
    length: String,
    #[serde(rename = "deforestation (ha)")]
    deforestation: f64,
}

fn write_allocation(path: &Path, result: &AllocationResult) -> Result {
    inf::fs::write_atomically(path, |file| -> Result {
        let mut writer = csv::Writer::from_writer(file);
        writer.serialize(ForecastRecord {
            period: "annual",
            length: "1".to_string(),
            deforestation: result.annual,
        })?;
        writer.serialize(ForecastRecord {
            period: "entire",
            length: result.horizon_years.to_string(),
            deforestation: result.entire,
        })?;

        writer.flush()?;
        Ok(())
    })
}

/// Allocates the jurisdictional deforestation to the project area.
///
/// The class rates are calibrated on the jurisdictional target, the annual deforestation of the project
/// is the sum over the classes of the number of project pixels times the deforestation density.
pub fn allocate_deforestation(opts: &AllocateOptions, progress: &mut impl ProgressNotification) -> Result<AllocationResult> {
    let histogram = risk_histogram(&opts.riskmap, &opts.project_borders, &opts.strategy, opts.blk_rows, progress)?;
    log::info!("{} pixels in the project area", histogram.total());

    let table = read_rate_table(&opts.rate_table)?;
    let calibrated = calibrate_rates(&table.rates, opts.deforestation_ha, opts.horizon_years)?;
    let densities = density_lookup(&calibrated);
    if let Some(path) = &opts.calibrated_rates {
        write_calibrated_rates(path, &table, &calibrated)?;
    }

    let (annual, missing_classes) = annual_deforestation(&histogram, &densities);
    if !missing_classes.is_empty() {
        log::warn!(
            "{} risk classes of the project area are missing in {}, their pixels are ignored (first: {})",
            missing_classes.len(),
            opts.rate_table.display(),
            missing_classes[0]
        );
    }

    let result = AllocationResult {
        annual: round_to_tenth(annual),
        entire: round_to_tenth(annual * opts.horizon_years),
        horizon_years: opts.horizon_years,
        missing_classes,
        histogram,
    };

    log::info!("Project deforestation: {} ha/yr, {} ha in {} years", result.annual, result.entire, opts.horizon_years);
    write_allocation(&opts.output_file, &result)?;

    if let Some(density_raster) = &opts.density_raster {
        write_density_raster(&opts.riskmap, &calibrated, density_raster, opts.blk_rows, progress)?;
    }

    Ok(result)
}

/// Writes the deforestation density (ha/pixel/yr) of every pixel of the risk raster.
///
/// Class 0 and classes without a rate are nodata (-9999). The output is removed when the creation fails.
pub fn write_density_raster(
    riskmap: &Path,
    rates: &[CalibratedRate],
    output: &Path,
    blk_rows: usize,
    progress: &mut impl ProgressNotification,
) -> Result {
    let result = densify(riskmap, rates, output, blk_rows, progress);
    if result.is_err()
        && let Err(err) = inf::fs::remove_file_if_exists(output)
    {
        log::warn!("Failed to remove incomplete density raster: {err}");
    }

    result
}

fn densify(riskmap: &Path, rates: &[CalibratedRate], output: &Path, blk_rows: usize, progress: &mut impl ProgressNotification) -> Result {
    let densities = density_lookup(rates);

    let risk = RasterDataset::open_read_only(riskmap)?;
    let meta = risk.metadata()?;
    let plan = BlockPlan::for_dataset(&risk, blk_rows)?;

    let options = GeoTiffWriteOptions {
        compression: Some(Compression::Deflate),
        predictor: Some(Predictor::Horizontal),
        bigtiff: true,
        ..Default::default()
    };
    let mut out = RasterDataset::create_like::<f64>(output, &meta, Some(DENSITY_NODATA), &options)?;

    progress.reset("Compute deforestation density", plan.nblock as u64);
    for block in plan.blocks() {
        let classes = risk.read_block::<f64>(1, &block)?;
        let density: Vec<f64> = classes
            .into_iter()
            .map(|class| {
                if class >= 1.0 && class <= RISK_CLASS_COUNT as f64 {
                    let density = densities[class as usize - 1];
                    if density.is_nan() { DENSITY_NODATA } else { density }
                } else {
                    DENSITY_NODATA
                }
            })
            .collect();

        out.write_block(1, &block, density)?;
        progress.tick(block.index as u64 + 1);
    }
    progress.done();

    out.flush()?;
    out.compute_statistics(1)?;
    log::info!("Deforestation density written to {}", output.display());
    Ok(())
}
