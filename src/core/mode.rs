//! Recording modes and the inputs each one requires.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a session records its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// One unlabeled interval per attempt, scoped to a primitive category.
    Primitive,
    /// Many labeled intervals per attempt, spanning the whole task.
    Continuous,
}

impl RecordingMode {
    /// Inputs the operator surface has to collect before a session can start.
    pub fn required_inputs(self) -> RequiredInputs {
        match self {
            RecordingMode::Primitive => RequiredInputs {
                task_name: true,
                primitive: true,
                labels: false,
            },
            RecordingMode::Continuous => RequiredInputs {
                task_name: true,
                primitive: false,
                labels: true,
            },
        }
    }
}

impl fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingMode::Primitive => write!(f, "primitive"),
            RecordingMode::Continuous => write!(f, "continuous"),
        }
    }
}

/// Set of inputs that are enabled for a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredInputs {
    pub task_name: bool,
    pub primitive: bool,
    pub labels: bool,
}

/// A validated recording key: the mode plus, for primitive sessions, the
/// category folder the attempts are filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionTarget {
    Primitive { category: String },
    Continuous,
}

impl SessionTarget {
    pub fn mode(&self) -> RecordingMode {
        match self {
            SessionTarget::Primitive { .. } => RecordingMode::Primitive,
            SessionTarget::Continuous => RecordingMode::Continuous,
        }
    }

    /// Category folder, if any.
    pub fn category(&self) -> Option<&str> {
        match self {
            SessionTarget::Primitive { category } => Some(category),
            SessionTarget::Continuous => None,
        }
    }
}

impl fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionTarget::Primitive { category } => write!(f, "primitive/{category}"),
            SessionTarget::Continuous => write!(f, "continuous"),
        }
    }
}
