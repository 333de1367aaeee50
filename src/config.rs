//! Configuration for the capture controller.

use crate::session::SessionOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the recordings tree; primitive categories are its sub-folders
    pub output_dir: PathBuf,

    /// Path for statistics and other state
    pub data_path: PathBuf,

    /// Device node or FIFO carrying the board's event stream
    pub device: PathBuf,

    /// Give up on a capture after this many seconds (unset: wait for the button)
    pub capture_timeout_secs: Option<u64>,

    /// Give up waiting for matching labels after this many seconds
    pub label_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("davis-capture");

        Self {
            output_dir: PathBuf::from("test_data"),
            data_path: data_dir,
            device: PathBuf::from("/dev/ttyACM0"),
            capture_timeout_secs: None,
            label_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("davis-capture")
            .join("config.json")
    }

    /// Location of the persisted statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("session_stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Wait limits for the session controller.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            capture_timeout: self.capture_timeout_secs.map(Duration::from_secs),
            label_timeout: self.label_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}
