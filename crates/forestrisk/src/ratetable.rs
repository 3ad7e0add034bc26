use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result, histogram::RISK_CLASS_COUNT};

/// A row of the class rate table: the modelled deforestation rate of a risk class
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClassRate {
    /// Risk class in the range [1, 65535]
    pub cat: u32,
    /// Number of forest pixels of the class at the start of the period
    pub nfor: f64,
    /// Modelled relative deforestation rate of the class
    pub rate_mod: f64,
    /// Pixel area in ha
    pub pixel_area: f64,
}

/// The class rate table with the raw records, extra columns are kept so they can be written back
#[derive(Debug, Clone)]
pub struct RateTable {
    pub path: PathBuf,
    pub headers: csv::StringRecord,
    pub records: Vec<csv::StringRecord>,
    pub rates: Vec<ClassRate>,
}

fn invalid_table(path: &Path, msg: impl Into<String>) -> Error {
    Error::InvalidRateTable {
        path: path.to_path_buf(),
        msg: msg.into(),
    }
}

/// Checks that the classes are in the valid range and strictly ascending
pub(crate) fn check_classes(rates: &[ClassRate]) -> std::result::Result<(), String> {
    if rates.is_empty() {
        return Err("the table contains no classes".to_string());
    }

    let mut previous = 0;
    for rate in rates {
        if rate.cat == 0 || rate.cat as usize > RISK_CLASS_COUNT {
            return Err(format!("class {} is outside of the range [1, {RISK_CLASS_COUNT}]", rate.cat));
        }

        if rate.cat <= previous {
            return Err(format!("classes are not strictly ascending ({} after {previous})", rate.cat));
        }

        previous = rate.cat;
    }

    Ok(())
}

/// Reads a class rate table, the header must contain `cat`, `nfor`, `rate_mod` and `pixel_area`
pub fn read_rate_table(path: &Path) -> Result<RateTable> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| match err.kind() {
        csv::ErrorKind::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => Error::Geo(geo::Error::InvalidPath(path.to_path_buf())),
        _ => invalid_table(path, err.to_string()),
    })?;

    let headers = reader.headers().map_err(|err| invalid_table(path, err.to_string()))?.clone();
    for column in ["cat", "nfor", "rate_mod", "pixel_area"] {
        if !headers.iter().any(|header| header == column) {
            return Err(invalid_table(path, format!("missing column '{column}'")));
        }
    }

    let mut records = Vec::new();
    let mut rates = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| invalid_table(path, err.to_string()))?;
        let rate: ClassRate = record
            .deserialize(Some(&headers))
            .map_err(|err| invalid_table(path, err.to_string()))?;
        rates.push(rate);
        records.push(record);
    }

    check_classes(&rates).map_err(|msg| invalid_table(path, msg))?;
    log::debug!("Read {} classes from {}", rates.len(), path.display());

    Ok(RateTable {
        path: path.to_path_buf(),
        headers,
        records,
        rates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_table(dir: &Path, content: &str) -> Result<PathBuf> {
        let path = dir.join("rates.csv");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    #[test]
    fn read_table_with_extra_columns() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = write_table(
            tmp.path(),
            "cat,nfor,ndefor,rate_mod,pixel_area,comment\n1,5,1,0.01,1.0,low\n2,6,2,0.05,1.0,mid\n3,2.0,0,0.1,1.0,high\n",
        )?;

        let table = read_rate_table(&path)?;
        assert_eq!(table.rates.len(), 3);
        assert_eq!(
            table.rates[2],
            ClassRate {
                cat: 3,
                nfor: 2.0,
                rate_mod: 0.1,
                pixel_area: 1.0
            }
        );
        assert_eq!(table.records[1].get(5), Some("mid"));
        assert_eq!(table.headers.len(), 6);
        Ok(())
    }

    #[test]
    fn missing_column() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = write_table(tmp.path(), "cat,nfor,pixel_area\n1,5,1.0\n")?;
        match read_rate_table(&path) {
            Err(Error::InvalidRateTable { msg, .. }) => assert!(msg.contains("rate_mod")),
            _ => panic!("Expected an invalid rate table error"),
        }
        Ok(())
    }

    #[test]
    fn classes_must_ascend() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = write_table(tmp.path(), "cat,nfor,rate_mod,pixel_area\n2,5,0.01,1.0\n1,6,0.05,1.0\n")?;
        assert!(matches!(read_rate_table(&path), Err(Error::InvalidRateTable { .. })));

        let path = write_table(tmp.path(), "cat,nfor,rate_mod,pixel_area\n0,5,0.01,1.0\n")?;
        assert!(matches!(read_rate_table(&path), Err(Error::InvalidRateTable { .. })));
        Ok(())
    }

    #[test]
    fn malformed_value() -> Result {
        let tmp = tempfile::tempdir()?;
        let path = write_table(tmp.path(), "cat,nfor,rate_mod,pixel_area\n1,five,0.01,1.0\n")?;
        assert!(matches!(read_rate_table(&path), Err(Error::InvalidRateTable { .. })));
        Ok(())
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_rate_table(Path::new("/does/not/exist.csv")),
            Err(Error::Geo(geo::Error::InvalidPath(_)))
        ));
    }
}
