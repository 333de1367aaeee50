//! Types shared by all capture engines.
//!
//! A capture engine owns the hardware link. The session controller never
//! talks to the hardware directly; it asks the engine for one capture at a
//! time and receives the raw markers and their epoch by value.

use crate::core::stop::StopSignal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Raw output of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    /// Marker times in hardware ticks, relative to the recording start
    pub raw: Vec<u64>,
    /// Absolute time origin of this attempt
    pub epoch: i64,
    /// Wall-clock length of the recording
    pub duration: Duration,
}

impl Capture {
    pub fn new(raw: Vec<u64>, epoch: i64) -> Self {
        Self {
            raw,
            epoch,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// What the controller asks for when it arms a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub task: String,
    pub attempt: u32,
    /// Where the camera's raw event file for this attempt belongs
    pub raw_path: PathBuf,
    /// Optional upper bound on the wait; `None` waits for the button
    pub timeout: Option<Duration>,
}

/// Result of a capture wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(Capture),
    /// The session was stopped before the capture completed.
    Interrupted,
}

/// Operator choice after an attempt has been saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Continue,
    Quit,
}

/// Errors reported by capture engines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture hardware unavailable at {device}: {reason}")]
    HardwareUnavailable { device: String, reason: String },

    #[error("capture engine is already running")]
    AlreadyRunning,

    #[error("capture engine is not running")]
    NotRunning,

    #[error("capture hardware disconnected")]
    Disconnected,

    #[error("hardware link failed: {0}")]
    Link(String),

    #[error("unexpected line from capture hardware: {line:?}")]
    Protocol { line: String },

    #[error("no capture within {0:?}")]
    TimedOut(Duration),
}

/// Hardware capability consumed by the session controller.
///
/// `capture_once` and `await_continue_or_quit` block until the hardware
/// reports, and must return promptly once `stop` fires.
pub trait CaptureEngine: Send {
    /// Acquire the hardware link.
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Release the hardware link. Calling it while stopped is a no-op.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Record one attempt.
    fn capture_once(
        &mut self,
        request: &CaptureRequest,
        stop: &StopSignal,
    ) -> Result<CaptureOutcome, CaptureError>;

    /// Wait for the operator to ask for another attempt or to finish.
    /// A fired stop signal counts as [`Decision::Quit`].
    fn await_continue_or_quit(&mut self, stop: &StopSignal) -> Result<Decision, CaptureError>;
}

impl<E: CaptureEngine + ?Sized> CaptureEngine for Box<E> {
    fn start(&mut self) -> Result<(), CaptureError> {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn capture_once(
        &mut self,
        request: &CaptureRequest,
        stop: &StopSignal,
    ) -> Result<CaptureOutcome, CaptureError> {
        (**self).capture_once(request, stop)
    }

    fn await_continue_or_quit(&mut self, stop: &StopSignal) -> Result<Decision, CaptureError> {
        (**self).await_continue_or_quit(stop)
    }
}
