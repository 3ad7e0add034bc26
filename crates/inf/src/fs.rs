use std::{fs::File, path::Path};

use crate::{Error, Result};

pub fn create_directory_for_file(p: &Path) -> Result {
    if let Some(parent_dir) = p.parent() {
        if parent_dir.as_os_str().is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(parent_dir).map_err(|e| {
            Error::Runtime(format!(
                "Failed to create output directory for file '{}' ({e})",
                p.to_string_lossy()
            ))
        })?;
    }

    Ok(())
}

/// Writes a file through a temporary sibling that is renamed onto `p` once the callback succeeded.
/// When the callback fails the temporary file is removed and `p` is left untouched.
pub fn write_atomically<E>(p: &Path, write: impl FnOnce(&mut File) -> std::result::Result<(), E>) -> std::result::Result<(), E>
where
    E: From<Error>,
{
    create_directory_for_file(p)?;

    let dir = match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(Error::from)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().sync_all().map_err(Error::from)?;
    tmp.persist(p).map_err(Error::from)?;

    Ok(())
}

/// Removes the file if it exists, a missing file is not an error
pub fn remove_file_if_exists(p: &Path) -> Result {
    match std::fs::remove_file(p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Runtime(format!("Failed to remove '{}' ({e})", p.to_string_lossy()))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn write_atomically_creates_parent_dirs() -> Result {
        let tmp = tempfile::TempDir::new()?;
        let path = tmp.path().join("nested").join("out.txt");

        write_atomically::<Error>(&path, |f| Ok(f.write_all(b"10")?))?;
        assert_eq!(std::fs::read_to_string(&path)?, "10");
        Ok(())
    }

    #[test]
    fn write_atomically_leaves_no_file_on_failure() -> Result {
        let tmp = tempfile::TempDir::new()?;
        let path = tmp.path().join("out.csv");

        let res = write_atomically::<Error>(&path, |f| {
            f.write_all(b"partial")?;
            Err(Error::Runtime("write aborted".to_string()))
        });

        assert!(res.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(tmp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn remove_missing_file() -> Result {
        let tmp = tempfile::TempDir::new()?;
        remove_file_if_exists(&tmp.path().join("missing.tif"))
    }
}
