//! Raw crawl artifacts: one JSON array of unmodified records per category.
//!
//! Files are written to a temp name and renamed into place, so a reader sees
//! either the previous complete artifact or the new one.

use std::path::{Path, PathBuf};

use tracing::debug;

use wateroflife_shared::{CatalogError, Category, RawRecord, Result};

/// Path of the artifact for `category` under `dir`.
pub fn artifact_path(dir: &Path, category: Category) -> PathBuf {
    dir.join(format!("{category}.json"))
}

/// Replace `<dir>/<category>.json` with `records`.
pub fn write_raw_artifact(dir: &Path, category: Category, records: &[RawRecord]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CatalogError::io(dir, e))?;

    let target = artifact_path(dir, category);
    let temp = dir.join(format!(".{category}.json.tmp"));

    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| CatalogError::validation(format!("JSON serialization failed: {e}")))?;

    std::fs::write(&temp, &json).map_err(|e| CatalogError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| CatalogError::io(&target, e))?;

    debug!(path = %target.display(), records = records.len(), bytes = json.len(), "wrote raw artifact");
    Ok(target)
}

/// Read a JSON array of objects, such as a raw artifact or a scraper dump.
pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let content = std::fs::read(path).map_err(|e| CatalogError::io(path, e))?;

    let values: Vec<serde_json::Value> = serde_json::from_slice(&content).map_err(|e| {
        CatalogError::decode(format!("{}: expected a JSON array: {e}", path.display()))
    })?;

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            RawRecord::from_value(value).ok_or_else(|| {
                CatalogError::decode(format!("{}: element {i} is not an object", path.display()))
            })
        })
        .collect()
}
