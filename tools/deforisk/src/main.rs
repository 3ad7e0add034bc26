use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::{Env, TimestampPrecision};
use forestrisk::{AllocateOptions, DefratePerCatOptions, HistogramStrategy, Period, SampleOptions};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use inf::progressinfo::{CallbackProgress, ProgressNotification, SilentProgress};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser, Debug)]
#[clap(name = "deforisk", about = "Deforestation risk sampling and allocation")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long = "noprogress", global = true)]
    pub no_progress: bool,

    /// Enable GDAL debug logging
    #[arg(long = "gdal-debug", global = true)]
    pub gdal_debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Draw a balanced sample of deforested and forest pixels with their covariate values
    Sample {
        /// Number of pixels per stratum
        #[arg(long = "nsamp", default_value = "10000")]
        nsamp: usize,

        /// Use the requested sample size instead of adapting it to the forest area
        #[arg(long = "no-adapt")]
        no_adapt: bool,

        #[arg(long = "seed", default_value = "1234")]
        seed: u64,

        /// Size of the spatial cells in km
        #[arg(long = "csize", default_value = "10")]
        csize: f64,

        /// Directory with the covariate rasters
        #[arg(long = "var-dir", default_value = "data")]
        var_dir: PathBuf,

        /// File name of the forest raster in the covariate directory
        #[arg(long = "input-forest-raster", default_value = "forest.tif")]
        forest_raster: PathBuf,

        #[arg(long = "output", short = 'o', default_value = "sample.txt")]
        output: PathBuf,

        /// Rows per block, 0 uses the native block size
        #[arg(long = "blk-rows", default_value = "0")]
        blk_rows: usize,
    },
    /// Allocate the deforestation of a jurisdiction to a project area
    Allocate {
        #[arg(long = "riskmap")]
        riskmap: PathBuf,

        /// Class rate table (cat, nfor, rate_mod, pixel_area)
        #[arg(long = "defrate-per-cat")]
        rate_table: PathBuf,

        /// Expected deforestation of the jurisdiction in ha
        #[arg(long = "defor-jurisdiction")]
        deforestation_ha: f64,

        /// Length of the forecast period in years
        #[arg(long = "years-forecast")]
        horizon_years: f64,

        #[arg(long = "project-borders")]
        project_borders: PathBuf,

        #[arg(long = "output", short = 'o', default_value = "defor_project.csv")]
        output: PathBuf,

        /// Also write the rate table with the calibrated rates
        #[arg(long = "calibrated-rates")]
        calibrated_rates: Option<PathBuf>,

        /// Also write the deforestation density of every pixel to this raster
        #[arg(long = "density-raster")]
        density_raster: Option<PathBuf>,

        /// Crop the risk map with gdalwarp instead of masking it in memory
        #[arg(long = "warp")]
        warp: bool,

        #[arg(long = "blk-rows", default_value = "0")]
        blk_rows: usize,
    },
    /// Count the pixels with a given value
    Countpix {
        #[arg(long = "input", short = 'i')]
        input: PathBuf,

        #[arg(long = "value", default_value = "1")]
        value: f64,

        #[arg(long = "blk-rows", default_value = "0")]
        blk_rows: usize,
    },
    /// Derive the class rate table from a forest cover change raster and a risk map
    Defrate {
        #[arg(long = "fcc")]
        fcc: PathBuf,

        #[arg(long = "riskmap")]
        riskmap: PathBuf,

        #[arg(long = "time-interval")]
        time_interval: f64,

        #[arg(long = "period", value_name = "calibration|validation|historical|forecast", default_value = "calibration")]
        period: Period,

        #[arg(long = "output", short = 'o', default_value = "defrate_cat.csv")]
        output: PathBuf,

        #[arg(long = "blk-rows", default_value = "128")]
        blk_rows: usize,
    },
}

fn run(command: Command, progress: &mut impl ProgressNotification) -> Result<()> {
    match command {
        Command::Sample {
            nsamp,
            no_adapt,
            seed,
            csize,
            var_dir,
            forest_raster,
            output,
            blk_rows,
        } => {
            let opts = SampleOptions {
                nsamp,
                adapt: !no_adapt,
                seed,
                csize_km: csize,
                var_dir,
                forest_raster,
                output_file: output,
                blk_rows,
            };

            let table = forestrisk::sample(&opts, progress)?;
            println!(
                "Sampled {} deforested and {} forest pixels",
                table.deforested_count,
                table.points.len() - table.deforested_count
            );
        }
        Command::Allocate {
            riskmap,
            rate_table,
            deforestation_ha,
            horizon_years,
            project_borders,
            output,
            calibrated_rates,
            density_raster,
            warp,
            blk_rows,
        } => {
            let strategy = if warp {
                let dir = output.parent().map(PathBuf::from).unwrap_or_default();
                HistogramStrategy::Warp {
                    cropped_raster: dir.join("project_riskmap.tif"),
                }
            } else {
                HistogramStrategy::InMemory
            };

            let opts = AllocateOptions {
                riskmap,
                rate_table,
                deforestation_ha,
                horizon_years,
                project_borders,
                output_file: output,
                calibrated_rates,
                density_raster,
                strategy,
                blk_rows,
            };

            let result = forestrisk::allocate_deforestation(&opts, progress)?;
            println!("annual: {} ha/yr", result.annual);
            println!("entire: {} ha ({} yr)", result.entire, result.horizon_years);
        }
        Command::Countpix { input, value, blk_rows } => {
            let count = forestrisk::countpix(&input, value, blk_rows, progress)?;
            println!("npix: {}", count.npix);
            println!("area: {} ha", count.area);
        }
        Command::Defrate {
            fcc,
            riskmap,
            time_interval,
            period,
            output,
            blk_rows,
        } => {
            let opts = DefratePerCatOptions {
                fcc,
                riskmap,
                time_interval,
                period,
                output_file: output,
                blk_rows,
            };

            forestrisk::defrate_per_cat(&opts, progress)?;
            println!("Class rates written to {}", opts.output_file.display());
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .build();

    let multi = MultiProgress::new();
    let level = logger.filter();
    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    let gdal_config = geo::RuntimeConfiguration::builder()
        .gdal_debug_log(opt.gdal_debug)
        .config_options(vec![("GDAL_NUM_THREADS".into(), "ALL_CPUS".into())])
        .build();
    gdal_config.apply()?;

    if opt.no_progress {
        return run(opt.command, &mut SilentProgress);
    }

    let progress = multi.add(ProgressBar::new(100));
    progress.set_style(ProgressStyle::with_template("{msg:<45} [{bar:40}] {percent:>3}%")?.progress_chars("=> "));

    let pb = progress.clone();
    let mut notifier = CallbackProgress::with_cb(move |fraction, phase| {
        if pb.message() != phase {
            pb.set_message(phase.to_string());
        }
        pb.set_position((fraction * 100.0).round() as u64);
    });

    run(opt.command, &mut notifier)?;
    progress.finish_with_message("Done");

    Ok(())
}
