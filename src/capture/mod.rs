//! Capture engines for the recording controller.
//!
//! The hardware link is hidden behind [`CaptureEngine`]. Two engines ship
//! with the crate: [`StreamEngine`], which reads the board's event stream,
//! and [`ScriptedEngine`], which replays a fixed script.

pub mod scripted;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use scripted::{ScriptHandle, ScriptLog, ScriptedCapture, ScriptedEngine};
pub use stream::{parse_line, EngineEvent, StreamEngine};
pub use types::{Capture, CaptureEngine, CaptureError, CaptureOutcome, CaptureRequest, Decision};
