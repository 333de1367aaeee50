//! Core functionality for the capture controller.
//!
//! This module contains:
//! - Recording modes and validated session targets
//! - Interval materialization from raw hardware ticks
//! - Label entry and reconciliation
//! - Output layout and attempt numbering
//! - The stop signal shared by all blocking waits

pub mod labels;
pub mod layout;
pub mod materialize;
pub mod mode;
pub mod stop;

// Re-export commonly used types
pub use labels::{
    parse_labels, LabelError, LabelMismatch, LabelReconciler, Reconciled, SharedLabelReconciler,
};
pub use layout::{AttemptPaths, LayoutError, OutputLayout, RAW_EXTENSION, RECORDS_EXTENSION};
pub use materialize::{
    materialize_labeled, materialize_unlabeled, segment_count, IntervalRecord, MaterializeError,
    UNIT_SCALE,
};
pub use mode::{RecordingMode, RequiredInputs, SessionTarget};
pub use stop::{stop_pair, StopSignal, StopTrigger};
