// Output sink: the review array and its run report, written as pretty JSON.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use harvest_common::{HarvestError, Review, RunReport};

/// Write the final collection as a JSON array.
pub fn write_reviews(path: &Path, reviews: &[Review]) -> Result<(), HarvestError> {
    write_json(path, &reviews)?;
    info!(path = %path.display(), records = reviews.len(), "Reviews written");
    Ok(())
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<(), HarvestError> {
    write_json(path, report)?;
    info!(path = %path.display(), "Run report written");
    Ok(())
}

/// Serialize into a temp file beside `path`, then rename over it, so a
/// crash never leaves a truncated file behind.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), HarvestError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
