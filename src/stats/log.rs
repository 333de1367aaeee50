//! Cumulative recording statistics.
//!
//! Counters are updated by the session controller and can be persisted so
//! `davis-capture status` can report totals across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Recording statistics for the current process.
#[derive(Debug)]
pub struct SessionStats {
    /// Number of sessions that got past hardware start
    sessions_started: AtomicU64,
    /// Number of attempts persisted
    attempts_saved: AtomicU64,
    /// Number of interval records written
    records_written: AtomicU64,
    /// Number of label/segment count mismatches reported
    label_mismatches: AtomicU64,
    /// Number of in-flight attempts dropped by a stop
    attempts_discarded: AtomicU64,
    /// Time this log was created
    started: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            attempts_saved: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            label_mismatches: AtomicU64::new(0),
            attempts_discarded: AtomicU64::new(0),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a stats log that continues from the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            warn!("could not load previous session stats: {e}");
        }

        stats
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persisted attempt and the number of rows it held.
    pub fn record_attempt_saved(&self, records: usize) {
        self.attempts_saved.fetch_add(1, Ordering::Relaxed);
        self.records_written
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_label_mismatch(&self) {
        self.label_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt_discarded(&self) {
        self.attempts_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            attempts_saved: self.attempts_saved.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            label_mismatches: self.label_mismatches.load(Ordering::Relaxed),
            attempts_discarded: self.attempts_discarded.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Human readable summary.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Recording Statistics:\n\
             - Sessions started: {}\n\
             - Attempts saved: {}\n\
             - Interval records written: {}\n\
             - Label mismatches reported: {}\n\
             - Attempts discarded by stop: {}",
            stats.sessions_started,
            stats.attempts_saved,
            stats.records_written,
            stats.label_mismatches,
            stats.attempts_discarded,
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                sessions_started: stats.sessions_started,
                attempts_saved: stats.attempts_saved,
                records_written: stats.records_written,
                label_mismatches: stats.label_mismatches,
                attempts_discarded: stats.attempts_discarded,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.attempts_saved
                    .store(persisted.attempts_saved, Ordering::Relaxed);
                self.records_written
                    .store(persisted.records_written, Ordering::Relaxed);
                self.label_mismatches
                    .store(persisted.label_mismatches, Ordering::Relaxed);
                self.attempts_discarded
                    .store(persisted.attempts_discarded, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub sessions_started: u64,
    pub attempts_saved: u64,
    pub records_written: u64,
    pub label_mismatches: u64,
    pub attempts_discarded: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    sessions_started: u64,
    attempts_saved: u64,
    records_written: u64,
    label_mismatches: u64,
    attempts_discarded: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats log.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counting() {
        let stats = SessionStats::new();
        stats.record_session_started();
        stats.record_attempt_saved(3);
        stats.record_attempt_saved(1);
        stats.record_label_mismatch();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.attempts_saved, 2);
        assert_eq!(snapshot.records_written, 4);
        assert_eq!(snapshot.label_mismatches, 1);
        assert_eq!(snapshot.attempts_discarded, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats").join("session_stats.json");

        let stats = SessionStats::with_persistence(path.clone());
        stats.record_attempt_saved(5);
        stats.record_attempt_discarded();
        stats.save().unwrap();

        let reloaded = SessionStats::with_persistence(path);
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.attempts_saved, 1);
        assert_eq!(snapshot.records_written, 5);
        assert_eq!(snapshot.attempts_discarded, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();
        assert!(summary.contains("Attempts saved"));
        assert!(summary.contains("Label mismatches"));
    }
}
