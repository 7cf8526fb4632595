//! Result serialization: CSV dataset plus an optional JSON failure report.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::model::{ResultSet, RevisionFailure, RevisionNumber};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

// Field order defines the CSV header.
#[derive(Serialize)]
struct Row<'a> {
    revision: RevisionNumber,
    version: &'a str,
    architecture: &'a str,
}

/// Writes `revision,version,architecture` rows ascending by revision.
///
/// The header is written even when `results` is empty.
pub fn write_results<W: Write>(writer: W, results: &ResultSet) -> Result<(), SinkError> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(["revision", "version", "architecture"])?;
    for (revision, metadata) in results.rows() {
        csv.serialize(Row {
            revision,
            version: &metadata.version,
            architecture: &metadata.architecture,
        })?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_results_file(path: &Path, results: &ResultSet) -> Result<(), SinkError> {
    let file = std::fs::File::create(path).map_err(|source| SinkError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_results(std::io::BufWriter::new(file), results)
}

/// Writes failures as a pretty-printed JSON array, ascending by revision.
pub fn write_failures_file(path: &Path, failures: &[RevisionFailure]) -> Result<(), SinkError> {
    let mut sorted = failures.to_vec();
    sorted.sort_unstable_by_key(|f| f.revision);
    let json = serde_json::to_string_pretty(&sorted)?;
    std::fs::write(path, json).map_err(|source| SinkError::Io {
        path: path.display().to_string(),
        source,
    })
}
