//! Conversion of raw hardware ticks into absolute interval records.
//!
//! The capture board reports marker times relative to the start of a
//! recording. Each attempt also carries an absolute epoch; every record is
//! shifted onto that epoch after scaling ticks into the epoch's unit:
//!
//! ```text
//! absolute = raw * UNIT_SCALE + epoch
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ticks-to-epoch-unit conversion factor.
pub const UNIT_SCALE: i64 = 1_000_000;

/// One persisted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalRecord {
    /// Primitive attempts: the whole capture as a single interval.
    Unlabeled { start: i64, end: i64 },
    /// Continuous attempts: one interval per segment.
    Labeled { label: i64, start: i64, end: i64 },
}

impl IntervalRecord {
    pub fn start(&self) -> i64 {
        match *self {
            IntervalRecord::Unlabeled { start, .. } | IntervalRecord::Labeled { start, .. } => {
                start
            }
        }
    }

    pub fn end(&self) -> i64 {
        match *self {
            IntervalRecord::Unlabeled { end, .. } | IntervalRecord::Labeled { end, .. } => end,
        }
    }

    pub fn label(&self) -> Option<i64> {
        match *self {
            IntervalRecord::Unlabeled { .. } => None,
            IntervalRecord::Labeled { label, .. } => Some(label),
        }
    }

    /// Render as a comma-separated row, without the line terminator.
    pub fn to_csv_row(&self) -> String {
        match *self {
            IntervalRecord::Unlabeled { start, end } => format!("{start}, {end}"),
            IntervalRecord::Labeled { label, start, end } => format!("{label}, {start}, {end}"),
        }
    }
}

/// Errors raised when a capture does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    #[error("capture produced no timestamps")]
    EmptyCapture,

    #[error("capture produced {len} timestamps, expected start/end pairs")]
    MalformedSegments { len: usize },

    #[error("{labels} label(s) for {segments} segment(s)")]
    LabelCountMismatch { labels: usize, segments: usize },

    #[error("timestamp {raw} overflows when shifted onto epoch {epoch}")]
    TimestampOverflow { raw: u64, epoch: i64 },
}

/// Shift a single raw tick value onto the capture epoch.
pub fn to_absolute(raw: u64, epoch: i64) -> Result<i64, MaterializeError> {
    i64::try_from(raw)
        .ok()
        .and_then(|r| r.checked_mul(UNIT_SCALE))
        .and_then(|scaled| scaled.checked_add(epoch))
        .ok_or(MaterializeError::TimestampOverflow { raw, epoch })
}

/// Number of complete segments in a raw capture.
pub fn segment_count(raw: &[u64]) -> Result<usize, MaterializeError> {
    if raw.len() % 2 != 0 {
        return Err(MaterializeError::MalformedSegments { len: raw.len() });
    }
    Ok(raw.len() / 2)
}

/// Build the single interval spanning an entire primitive capture.
pub fn materialize_unlabeled(
    raw: &[u64],
    epoch: i64,
) -> Result<Vec<IntervalRecord>, MaterializeError> {
    let (first, last) = match (raw.first(), raw.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(MaterializeError::EmptyCapture),
    };

    Ok(vec![IntervalRecord::Unlabeled {
        start: to_absolute(first, epoch)?,
        end: to_absolute(last, epoch)?,
    }])
}

/// Build one labeled interval per `(start, end)` pair, in input order.
pub fn materialize_labeled(
    raw: &[u64],
    epoch: i64,
    labels: &[i64],
) -> Result<Vec<IntervalRecord>, MaterializeError> {
    let segments = segment_count(raw)?;
    if labels.len() != segments {
        return Err(MaterializeError::LabelCountMismatch {
            labels: labels.len(),
            segments,
        });
    }

    raw.chunks_exact(2)
        .zip(labels)
        .map(|(pair, &label)| {
            Ok(IntervalRecord::Labeled {
                label,
                start: to_absolute(pair[0], epoch)?,
                end: to_absolute(pair[1], epoch)?,
            })
        })
        .collect()
}
