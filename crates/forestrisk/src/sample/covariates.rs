use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A covariate raster and the name of its column in the sample table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Covariate {
    pub path: PathBuf,
    pub name: String,
}

/// All the `*.tif` rasters in the directory, sorted by path
pub fn list_covariates(var_dir: &Path) -> Result<Vec<Covariate>> {
    let entries = std::fs::read_dir(var_dir).map_err(|e| {
        Error::InvalidArgument(format!("Failed to list the covariate directory {} ({e})", var_dir.display()))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tif") {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(Error::NoCovariates(var_dir.to_path_buf()));
    }

    paths.sort();
    Ok(paths
        .into_iter()
        .map(|path| Covariate {
            name: column_name(&path),
            path,
        })
        .collect())
}

/// The file name up to the first '.'
fn column_name(path: &Path) -> String {
    let file_name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    match file_name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file_name.to_string(),
    }
}
