//! Recording session control.
//!
//! This module contains:
//! - The session state machine driving capture attempts
//! - A cross-thread handle for stopping and observing a session
//! - Operator notices emitted along the way

pub mod controller;
pub mod handle;
pub mod notice;

// Re-export commonly used types
pub use controller::{
    SessionController, SessionError, SessionOptions, SessionRequest, SessionSummary,
};
pub use handle::{SessionHandle, SessionState};
pub use notice::{Notice, SessionEnd};
