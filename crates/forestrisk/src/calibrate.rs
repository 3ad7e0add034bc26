//! Calibration of the modelled class rates on a jurisdictional deforestation target.
//!
//! Units:
//! * `rate_mod` is a relative rate, only the ratios between the classes matter
//! * `rate_abs` is the probability that a forest pixel of the class is deforested over the whole horizon
//! * `defor_dens` is the expected deforestation in ha per pixel per year

use std::path::Path;

use crate::{Error, Result, ratetable::ClassRate, ratetable::RateTable, ratetable::check_classes};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibratedRate {
    pub cat: u32,
    pub nfor: f64,
    pub rate_mod: f64,
    pub pixel_area: f64,
    pub rate_abs: f64,
    pub defor_dens: f64,
}

/// Rescales the modelled rates so that the forest of the jurisdiction loses `deforestation_ha` over `horizon_years`.
///
/// `alpha = D / (pixel_area * sum(nfor * rate_mod))`, `rate_abs = alpha * rate_mod` and
/// `defor_dens = rate_abs * pixel_area / T`. The pixel area is taken from the first class.
pub fn calibrate_rates(rates: &[ClassRate], deforestation_ha: f64, horizon_years: f64) -> Result<Vec<CalibratedRate>> {
    check_classes(rates).map_err(Error::InvalidArgument)?;

    if horizon_years.is_nan() || horizon_years <= 0.0 {
        return Err(Error::InvalidArgument(format!(
            "The forecast horizon must be positive ({horizon_years} years)"
        )));
    }

    if deforestation_ha.is_nan() || deforestation_ha < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "The deforestation target can not be negative ({deforestation_ha} ha)"
        )));
    }

    let pixel_area = rates[0].pixel_area;
    let expected: f64 = rates.iter().map(|r| r.nfor * r.rate_mod).sum();
    if expected == 0.0 || !expected.is_finite() {
        return Err(Error::ZeroExpectedDeforestation);
    }

    let forest_area = pixel_area * rates.iter().map(|r| r.nfor).sum::<f64>();
    if deforestation_ha > forest_area {
        return Err(Error::TargetExceedsForest {
            target: deforestation_ha,
            max: forest_area,
        });
    }

    let alpha = deforestation_ha / (pixel_area * expected);
    log::debug!("Correction factor {alpha} (sum of nfor * rate_mod = {expected})");

    let calibrated: Vec<CalibratedRate> = rates
        .iter()
        .map(|rate| {
            let rate_abs = alpha * rate.rate_mod;
            CalibratedRate {
                cat: rate.cat,
                nfor: rate.nfor,
                rate_mod: rate.rate_mod,
                pixel_area: rate.pixel_area,
                rate_abs,
                defor_dens: rate_abs * pixel_area / horizon_years,
            }
        })
        .collect();

    let no_forest = calibrated.iter().filter(|r| r.nfor == 0.0).count();
    if no_forest > 0 {
        log::warn!("{no_forest} risk classes have no forest pixels");
    }

    let saturated: Vec<u32> = calibrated.iter().filter(|r| r.rate_abs > 1.0).map(|r| r.cat).collect();
    if !saturated.is_empty() {
        log::warn!(
            "The absolute deforestation rate exceeds 1 for {} classes (first: {})",
            saturated.len(),
            saturated[0]
        );
    }

    Ok(calibrated)
}

/// Writes the rate table with the `rate_abs` and `defor_dens` columns replaced or appended
pub fn write_calibrated_rates(path: &Path, table: &RateTable, calibrated: &[CalibratedRate]) -> Result {
    if table.records.len() != calibrated.len() {
        return Err(Error::InvalidArgument(format!(
            "Calibrated rate count ({}) does not match the rate table ({})",
            calibrated.len(),
            table.records.len()
        )));
    }

    let mut headers: Vec<String> = table.headers.iter().map(String::from).collect();
    let mut column_index = |name: &str| match headers.iter().position(|h| h == name) {
        Some(index) => index,
        None => {
            headers.push(name.to_string());
            headers.len() - 1
        }
    };

    let rate_abs_index = column_index("rate_abs");
    let defor_dens_index = column_index("defor_dens");

    inf::fs::write_atomically(path, |file| -> Result {
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&headers)?;
        for (record, rate) in table.records.iter().zip(calibrated) {
            let mut row: Vec<String> = record.iter().map(String::from).collect();
            row.resize(headers.len(), String::new());
            row[rate_abs_index] = rate.rate_abs.to_string();
            row[defor_dens_index] = rate.defor_dens.to_string();
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    })
}
