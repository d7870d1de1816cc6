use std::fs;
use std::path::Path;

use camino::Utf8Path;
use tempfile::Builder;
use zip::ZipArchive;

use crate::error::ListerError;

const WORKBOOK_ENTRY: &str = "xl/workbook.xml";

pub fn ensure_parent_dir(path: &Utf8Path) -> Result<(), ListerError> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|err| ListerError::Filesystem(format!("create {parent}: {err}"))),
        _ => Ok(()),
    }
}

/// Writes through a temp file next to `target`, validates it, then renames it into place.
pub fn write_atomic<F>(target: &Utf8Path, write: F) -> Result<(), ListerError>
where
    F: FnOnce(&Path) -> Result<(), ListerError>,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let temp = Builder::new()
        .prefix(".harbor-lister-")
        .suffix(".xlsx")
        .tempfile_in(dir)
        .map_err(|err| ListerError::Filesystem(format!("temp file in {dir}: {err}")))?;

    write(temp.path())?;
    validate_xlsx(temp.path())?;

    temp.persist(target.as_std_path())
        .map_err(|err| ListerError::Filesystem(format!("persist {target}: {}", err.error)))?;
    Ok(())
}

pub fn validate_xlsx(path: &Path) -> Result<(), ListerError> {
    let file = fs::File::open(path)
        .map_err(|err| ListerError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| ListerError::Spreadsheet(err.to_string()))?;
    archive.by_name(WORKBOOK_ENTRY).map_err(|err| {
        ListerError::Spreadsheet(format!("{WORKBOOK_ENTRY} missing from workbook: {err}"))
    })?;
    Ok(())
}
