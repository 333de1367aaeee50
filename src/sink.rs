//! Persistence of interval records.
//!
//! Each attempt is written as one comma-separated file. Files appear
//! atomically: rows go to a temporary file in the target directory, which is
//! then renamed over the final path, so concurrent readers never observe a
//! partial attempt.

use crate::core::materialize::IntervalRecord;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Destination for the records of one attempt.
pub trait RecordSink: Send {
    fn write_records(&self, path: &Path, records: &[IntervalRecord]) -> Result<(), SinkError>;
}

/// Writes `", "`-delimited integer rows, one per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSink;

impl CsvSink {
    pub fn new() -> Self {
        Self
    }
}

/// Render records the way downstream tooling reads them.
pub fn render_csv(records: &[IntervalRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_csv_row());
        out.push('\n');
    }
    out
}

impl RecordSink for CsvSink {
    fn write_records(&self, path: &Path, records: &[IntervalRecord]) -> Result<(), SinkError> {
        atomic_write(path, &render_csv(records))
    }
}

/// Write `contents` to `path` through a temp file and rename.
fn atomic_write(path: &Path, contents: &str) -> Result<(), SinkError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
        context: format!("creating {}", dir.display()),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| SinkError::Io {
        context: format!("creating temp file in {}", dir.display()),
        source,
    })?;

    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|source| SinkError::Io {
            context: format!("writing temp file for {}", path.display()),
            source,
        })?;

    tmp.persist(path).map_err(|e| SinkError::Io {
        context: format!("persisting {}", path.display()),
        source: e.error,
    })?;

    Ok(())
}
