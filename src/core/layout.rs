//! Output directory layout and attempt numbering.
//!
//! ```text
//! <output_dir>/<primitive>/<task>_<attempt>.csv   primitive sessions
//! <output_dir>/<primitive>/<task>_<attempt>.aedat
//! <output_dir>/<task>_<attempt>.csv               continuous sessions
//! <output_dir>/<task>_<attempt>.aedat
//! ```
//!
//! Attempt numbers are derived by counting what is already on disk. Nothing
//! is reserved, so two writers on the same key can pick the same number.

use crate::core::mode::SessionTarget;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of the interval records written per attempt.
pub const RECORDS_EXTENSION: &str = "csv";
/// Extension of the raw event file the camera writes per attempt.
pub const RAW_EXTENSION: &str = "aedat";

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Files belonging to one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPaths {
    pub attempt: u32,
    /// Interval records written by this crate.
    pub records: PathBuf,
    /// Raw event file, written by the capture hardware.
    pub raw: PathBuf,
}

/// Naming rules rooted at one output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the attempts of a target.
    pub fn target_dir(&self, target: &SessionTarget) -> PathBuf {
        match target.category() {
            Some(category) => self.root.join(category),
            None => self.root.clone(),
        }
    }

    /// Paths of attempt `attempt` of `task`.
    pub fn attempt_paths(&self, target: &SessionTarget, task: &str, attempt: u32) -> AttemptPaths {
        let dir = self.target_dir(target);
        let stem = format!("{task}_{attempt}");
        AttemptPaths {
            attempt,
            records: dir.join(format!("{stem}.{RECORDS_EXTENSION}")),
            raw: dir.join(format!("{stem}.{RAW_EXTENSION}")),
        }
    }

    /// Number of attempts of `task` already on disk for `target`, plus one.
    pub fn next_attempt(&self, target: &SessionTarget, task: &str) -> Result<u32, LayoutError> {
        let dir = self.target_dir(target);
        let existing = existing_attempts(&dir, task)?;
        Ok(existing.len() as u32 + 1)
    }

    /// Create the directory of a target if needed.
    pub fn ensure_target_dir(&self, target: &SessionTarget) -> Result<PathBuf, LayoutError> {
        let dir = self.target_dir(target);
        std::fs::create_dir_all(&dir).map_err(|source| LayoutError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Primitive categories: the sub-folders of the output directory, sorted.
    pub fn known_primitives(&self) -> Result<Vec<String>, LayoutError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LayoutError::Scan {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut categories: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        categories.sort();
        Ok(categories)
    }
}

/// Distinct attempt numbers of `task` found in `dir`.
///
/// A record file and its raw file count as one attempt.
fn existing_attempts(dir: &Path, task: &str) -> Result<BTreeSet<u32>, LayoutError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(source) => {
            return Err(LayoutError::Scan {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    Ok(entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().and_then(|name| parse_attempt(name, task)))
        .collect())
}

/// Extract `n` from `<task>_<n>.csv` or `<task>_<n>.aedat`.
fn parse_attempt(file_name: &str, task: &str) -> Option<u32> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if extension != RECORDS_EXTENSION && extension != RAW_EXTENSION {
        return None;
    }
    let number = stem.strip_prefix(task)?.strip_prefix('_')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}
