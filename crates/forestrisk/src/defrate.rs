//! Derivation of the class rate table from a forest cover change raster and a risk raster.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use geo::raster::{BlockPlan, RasterDataset};
use inf::progressinfo::ProgressNotification;
use serde::Serialize;

use crate::{Error, Result, histogram::RISK_CLASS_COUNT};

/// The period the forest cover change raster covers, determines which fcc values are forest and deforested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    /// forest: fcc > 0, deforested: fcc == 1
    #[default]
    Calibration,
    /// forest: fcc > 1, deforested: fcc == 2
    Validation,
    /// forest: fcc > 0, deforested: fcc in {1, 2}
    Historical,
    /// Same classification as `Historical`
    Forecast,
}

impl Period {
    fn is_forest(self, fcc: f64) -> bool {
        match self {
            Period::Validation => fcc > 1.0,
            _ => fcc > 0.0,
        }
    }

    fn is_deforested(self, fcc: f64) -> bool {
        match self {
            Period::Calibration => fcc == 1.0,
            Period::Validation => fcc == 2.0,
            Period::Historical | Period::Forecast => fcc == 1.0 || fcc == 2.0,
        }
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "calibration" => Ok(Period::Calibration),
            "validation" => Ok(Period::Validation),
            "historical" => Ok(Period::Historical),
            "forecast" => Ok(Period::Forecast),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid period '{s}', expected calibration, validation, historical or forecast"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DefratePerCatOptions {
    /// Forest cover change raster
    pub fcc: PathBuf,
    pub riskmap: PathBuf,
    /// Length of the period in years
    pub time_interval: f64,
    pub period: Period,
    pub output_file: PathBuf,
    pub blk_rows: usize,
}

impl Default for DefratePerCatOptions {
    fn default() -> Self {
        DefratePerCatOptions {
            fcc: PathBuf::from("fcc.tif"),
            riskmap: PathBuf::from("riskmap.tif"),
            time_interval: 10.0,
            period: Period::default(),
            output_file: PathBuf::from("defrate_cat.csv"),
            blk_rows: 128,
        }
    }
}

/// A row of the derived class rate table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassDefrate {
    pub cat: u32,
    pub nfor: u64,
    pub ndefor: u64,
    /// Observed annual deforestation rate, NaN for classes without forest
    pub rate_obs: f64,
    pub rate_mod: f64,
    pub rate_abs: f64,
    pub pixel_area: f64,
    /// ha per pixel per year
    pub defor_dens: f64,
}

/// Modelled relative rate of a risk class, linear from 1e-6 for class 1 to 1 for class 65535
pub fn class_rate_mod(cat: u32) -> f64 {
    ((cat as f64 - 1.0) * 999999.0 / (RISK_CLASS_COUNT as f64 - 1.0) + 1.0) * 1e-6
}

fn observed_rate(nfor: u64, ndefor: u64, time_interval: f64) -> f64 {
    if nfor == 0 {
        return f64::NAN;
    }

    1.0 - (1.0 - ndefor as f64 / nfor as f64).powf(1.0 / time_interval)
}

fn class_rates(nfor: &[u64], ndefor: &[u64], pixel_area: f64, time_interval: f64) -> Vec<ClassDefrate> {
    let total_defor: f64 = ndefor.iter().map(|&n| n as f64).sum();
    let expected: f64 = nfor
        .iter()
        .enumerate()
        .map(|(i, &n)| n as f64 * class_rate_mod(i as u32 + 1))
        .sum();

    // No forest in any class: keep the relative rates without scaling
    let alpha = if expected > 0.0 { total_defor / expected } else { 0.0 };

    nfor.iter()
        .zip(ndefor)
        .enumerate()
        .map(|(i, (&nfor, &ndefor))| {
            let cat = i as u32 + 1;
            let rate_mod = class_rate_mod(cat);
            let rate_abs = rate_mod * alpha;
            ClassDefrate {
                cat,
                nfor,
                ndefor,
                rate_obs: observed_rate(nfor, ndefor, time_interval),
                rate_mod,
                rate_abs,
                pixel_area,
                defor_dens: rate_abs * pixel_area / time_interval,
            }
        })
        .collect()
}

/// A line of the class rate file, the observed rate is left empty for classes without forest
#[derive(Serialize)]
struct ClassRateRecord {
    cat: u32,
    nfor: u64,
    ndefor: u64,
    rate_obs: Option<f64>,
    rate_mod: f64,
    rate_abs: f64,
    time_interval: f64,
    pixel_area: f64,
    defor_dens: f64,
}

impl ClassRateRecord {
    fn new(rate: &ClassDefrate, time_interval: f64) -> Self {
        ClassRateRecord {
            cat: rate.cat,
            nfor: rate.nfor,
            ndefor: rate.ndefor,
            rate_obs: Some(rate.rate_obs).filter(|rate| !rate.is_nan()),
            rate_mod: rate.rate_mod,
            rate_abs: rate.rate_abs,
            time_interval,
            pixel_area: rate.pixel_area,
            defor_dens: rate.defor_dens,
        }
    }
}

fn write_class_rates(path: &Path, rates: &[ClassDefrate], time_interval: f64) -> Result {
    inf::fs::write_atomically(path, |file| -> Result {
        let mut writer = csv::Writer::from_writer(file);
        for rate in rates {
            writer.serialize(ClassRateRecord::new(rate, time_interval))?;
        }

        writer.flush()?;
        Ok(())
    })
}

/// Counts the forest and deforested pixels per risk class and derives the rates of all 65535 classes.
///
/// The resulting table can be used as input of the allocation.
pub fn defrate_per_cat(opts: &DefratePerCatOptions, progress: &mut impl ProgressNotification) -> Result<Vec<ClassDefrate>> {
    if opts.time_interval.is_nan() || opts.time_interval <= 0.0 {
        return Err(Error::InvalidArgument(format!(
            "The time interval must be positive ({} years)",
            opts.time_interval
        )));
    }

    let fcc = RasterDataset::open_read_only(&opts.fcc)?;
    let risk = RasterDataset::open_read_only(&opts.riskmap)?;
    if fcc.raster_size() != risk.raster_size() {
        return Err(Error::Geo(geo::Error::SizeMismatch {
            size1: fcc.raster_size(),
            size2: risk.raster_size(),
        }));
    }

    let pixel_area = fcc.geo_transform()?.pixel_area() / 10000.0;
    let plan = BlockPlan::for_dataset(&fcc, opts.blk_rows)?;

    let mut nfor = vec![0u64; RISK_CLASS_COUNT];
    let mut ndefor = vec![0u64; RISK_CLASS_COUNT];

    progress.reset("Count forest pixels per class", plan.nblock as u64);
    for block in plan.blocks() {
        let fcc_data = fcc.read_block::<f64>(1, &block)?;
        let risk_data = risk.read_block::<f64>(1, &block)?;
        for (&fcc_value, &class) in fcc_data.iter().zip(&risk_data) {
            if !(class >= 1.0 && class <= RISK_CLASS_COUNT as f64) {
                continue;
            }

            let index = class as usize - 1;
            if opts.period.is_forest(fcc_value) {
                nfor[index] += 1;
            }

            if opts.period.is_deforested(fcc_value) {
                ndefor[index] += 1;
            }
        }

        progress.tick(block.index as u64 + 1);
    }
    progress.done();

    log::info!(
        "{} forest pixels, {} deforested pixels",
        nfor.iter().sum::<u64>(),
        ndefor.iter().sum::<u64>()
    );

    let rates = class_rates(&nfor, &ndefor, pixel_area, opts.time_interval);
    write_class_rates(&opts.output_file, &rates, opts.time_interval)?;
    Ok(rates)
}
