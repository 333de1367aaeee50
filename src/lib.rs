//! davis-capture - recording session controller for event camera captures.
//!
//! An operator records a task over and over while a button board marks
//! segments of interest. This crate turns the board's relative marker times
//! into absolute, optionally labeled intervals and files them next to the
//! camera's raw recordings.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         davis-capture                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Capture   │──▶│   Session   │──▶│ Materialize │         │
//! │  │   Engine    │   │ Controller  │   │ (intervals) │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                       ▲       │             │                │
//! │                       │       ▼             ▼                │
//! │               ┌─────────────┐        ┌─────────────┐         │
//! │               │   Label     │        │  CSV Sink   │         │
//! │               │ Reconciler  │        │  (atomic)   │         │
//! │               └─────────────┘        └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use davis_capture::{
//!     capture::StreamEngine,
//!     core::OutputLayout,
//!     session::{SessionController, SessionRequest},
//!     sink::CsvSink,
//! };
//!
//! let engine = StreamEngine::device("/dev/ttyACM0");
//! let mut controller =
//!     SessionController::new(engine, CsvSink::new(), OutputLayout::new("test_data"));
//!
//! // Labels can be confirmed from any thread while the session runs
//! controller.labels().confirm("1,2,3").expect("labels are integers");
//!
//! let summary = controller
//!     .run(&SessionRequest::continuous("assembly"))
//!     .expect("session failed");
//! println!("saved {} attempt(s)", summary.attempts_saved);
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod session;
pub mod sink;
pub mod stats;

// Re-export key types at crate root for convenience
pub use capture::{Capture, CaptureEngine, CaptureError, Decision, ScriptedEngine, StreamEngine};
pub use config::{Config, ConfigError};
pub use self::core::{
    IntervalRecord, LabelReconciler, OutputLayout, RecordingMode, SessionTarget, UNIT_SCALE,
};
pub use session::{
    Notice, SessionController, SessionError, SessionHandle, SessionOptions, SessionRequest,
    SessionState, SessionSummary,
};
pub use sink::{CsvSink, RecordSink};
pub use stats::{SessionStats, SharedSessionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Operator instructions shown when a recording starts.
pub const OPERATOR_GUIDE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                 DAVIS CAPTURE - RECORDING GUIDE                  ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Each attempt is recorded between two presses of the board's     ║
║  record button. After an attempt is saved:                       ║
║                                                                  ║
║    • Red button    record another attempt                        ║
║    • White button  finish the session                            ║
║                                                                  ║
║  Continuous recordings need one label per recorded segment.      ║
║  Type them as integers, e.g. 1,2,3 and press Enter. A wrong      ║
║  count is reported and the attempt waits for a new list.         ║
║                                                                  ║
║  Press Ctrl+C to stop at any time. The attempt in progress is    ║
║  discarded; saved attempts are kept.                             ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
