//! Label entry and reconciliation for continuous recordings.
//!
//! The operator types the label list once per session, while the capture
//! thread only learns how many segments an attempt produced after the fact.
//! [`LabelReconciler`] is the single owner of the confirmed list: the input
//! handler writes through [`LabelReconciler::confirm`] and the session driver
//! blocks in [`LabelReconciler::reconcile`] until the list matches.

use crate::core::stop::StopSignal;
use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Errors from label entry or reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("inserted non-integer label {token:?}")]
    Parse { token: String },

    #[error("labels were not reconciled within {0:?}")]
    TimedOut(Duration),
}

/// A label list that does not fit the attempt being saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMismatch {
    pub labels: usize,
    pub segments: usize,
}

/// Result of a reconciliation wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Ready(Vec<i64>),
    Interrupted,
}

#[derive(Debug, Default)]
struct LabelState {
    labels: Vec<i64>,
    confirmed: bool,
}

/// Owner of the confirmed label list.
#[derive(Debug)]
pub struct LabelReconciler {
    state: Mutex<LabelState>,
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
}

/// Reconciler shared between the input handler and the session driver.
pub type SharedLabelReconciler = Arc<LabelReconciler>;

impl LabelReconciler {
    pub fn new() -> Self {
        // Capacity 1: confirmations arriving while nobody waits collapse into
        // a single wake-up, the waiter always re-reads the state.
        let (notify_tx, notify_rx) = bounded(1);
        Self {
            state: Mutex::new(LabelState::default()),
            notify_tx,
            notify_rx,
        }
    }

    pub fn shared() -> SharedLabelReconciler {
        Arc::new(Self::new())
    }

    /// Parse and install a new label list.
    ///
    /// On a parse failure nothing changes and the previous list stays in
    /// effect.
    pub fn confirm(&self, text: &str) -> Result<Vec<i64>, LabelError> {
        let labels = parse_labels(text)?;
        {
            let mut state = self.lock();
            state.labels = labels.clone();
            state.confirmed = true;
        }
        let _ = self.notify_tx.try_send(());
        Ok(labels)
    }

    /// Snapshot of the current list.
    pub fn labels(&self) -> Vec<i64> {
        self.lock().labels.clone()
    }

    pub fn is_confirmed(&self) -> bool {
        self.lock().confirmed
    }

    /// Block until a confirmed list of exactly `segments` labels is in place.
    ///
    /// A confirmed list of the wrong size is reported through `on_mismatch`
    /// once, then the reconciler waits for the next confirmation. The wait
    /// ends early when `stop` fires, or with [`LabelError::TimedOut`] when a
    /// timeout is given and elapses.
    ///
    /// With `segments == 0` there is nothing to label: the result is an empty
    /// list at once, whatever is confirmed, and the confirmed list is kept for
    /// the next attempt.
    pub fn reconcile<F>(
        &self,
        segments: usize,
        stop: &StopSignal,
        timeout: Option<Duration>,
        mut on_mismatch: F,
    ) -> Result<Reconciled, LabelError>
    where
        F: FnMut(LabelMismatch),
    {
        if segments == 0 {
            return Ok(Reconciled::Ready(Vec::new()));
        }

        let deadline = timeout.map(after).unwrap_or_else(never);

        loop {
            let mismatch = {
                let mut state = self.lock();
                if state.confirmed && state.labels.len() == segments {
                    return Ok(Reconciled::Ready(state.labels.clone()));
                }
                if state.confirmed {
                    state.confirmed = false;
                    Some(LabelMismatch {
                        labels: state.labels.len(),
                        segments,
                    })
                } else {
                    None
                }
            };

            if let Some(mismatch) = mismatch {
                on_mismatch(mismatch);
            }

            select! {
                recv(self.notify_rx) -> _ => {}
                recv(stop.receiver()) -> _ => return Ok(Reconciled::Interrupted),
                recv(deadline) -> _ => {
                    return Err(LabelError::TimedOut(timeout.unwrap_or_default()));
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LabelState> {
        // Writers replace the whole state under the lock, so a poisoned guard
        // still holds a consistent value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LabelReconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse comma-separated integer labels, e.g. `"1, 2,-3"`.
pub fn parse_labels(text: &str) -> Result<Vec<i64>, LabelError> {
    text.split(',')
        .map(|token| {
            let token = token.trim();
            token.parse::<i64>().map_err(|_| LabelError::Parse {
                token: token.to_string(),
            })
        })
        .collect()
}
