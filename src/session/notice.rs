//! Operator-facing messages emitted by the session controller.
//!
//! The controller never prints. Whatever surface drives it (the CLI, a GUI)
//! drains these from a channel and shows them to the operator.

use crate::core::labels::LabelMismatch;
use crate::core::mode::SessionTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// How a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEnd {
    /// The operator pressed quit on the board.
    Quit,
    /// A stop command arrived.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notice {
    SessionStarted {
        session_id: Uuid,
        task: String,
        target: SessionTarget,
        first_attempt: u32,
    },
    AttemptStarted {
        attempt: u32,
        raw_path: PathBuf,
    },
    AwaitingLabels {
        attempt: u32,
        segments: usize,
    },
    LabelMismatch(LabelMismatch),
    AttemptSaved {
        attempt: u32,
        path: PathBuf,
        records: usize,
        duration: Duration,
    },
    AwaitingDecision,
    AttemptDiscarded {
        attempt: u32,
    },
    SessionEnded {
        attempts_saved: u32,
        end: SessionEnd,
    },
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SessionStarted {
                task,
                target,
                first_attempt,
                ..
            } => write!(
                f,
                "Recording {task} ({target}), starting at attempt {first_attempt}"
            ),
            Notice::AttemptStarted { attempt, .. } => {
                write!(f, "Attempt {attempt}: waiting for recording")
            }
            Notice::AwaitingLabels { segments, .. } => {
                write!(f, "Waiting for {segments} label(s)")
            }
            Notice::LabelMismatch(m) => write!(
                f,
                "{} label(s) and {} time(s). Please insert correct amount of label(s)",
                m.labels, m.segments
            ),
            Notice::AttemptSaved {
                attempt,
                path,
                records,
                duration,
            } => write!(
                f,
                "Recording duration: {:.2} seconds. Attempt {attempt} saved to {} ({records} interval(s))",
                duration.as_secs_f64(),
                path.display()
            ),
            Notice::AwaitingDecision => write!(
                f,
                "Press the Red Button to continue or the White Button to quit."
            ),
            Notice::AttemptDiscarded { attempt } => {
                write!(f, "Attempt {attempt} discarded")
            }
            Notice::SessionEnded {
                attempts_saved,
                end,
            } => match end {
                SessionEnd::Quit => write!(f, "Finished after {attempts_saved} attempt(s)"),
                SessionEnd::Stopped => {
                    write!(f, "Stopped capturing after {attempts_saved} attempt(s)")
                }
            },
            Notice::Error(message) => write!(f, "Error: {message}"),
        }
    }
}
