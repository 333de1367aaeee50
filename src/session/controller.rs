//! The recording session state machine.
//!
//! One call to [`SessionController::run`] drives a whole session:
//!
//! ```text
//! validate ─▶ number attempt ─▶ start engine
//!                                   │
//!      ┌────────────────────────────┘
//!      ▼
//!   capture ─▶ (continuous) reconcile labels ─▶ materialize ─▶ persist
//!      ▲                                                          │
//!      └──────────── continue ◀─ await button ◀───────────────────┘
//!                                   │ quit / stop
//!                                   ▼
//!                             release engine
//! ```
//!
//! A stop command interrupts whichever wait is in progress; the attempt in
//! flight is dropped and nothing is written for it. Hardware, data and
//! persistence failures end the session and are returned to the caller.

use crate::capture::types::{CaptureEngine, CaptureError, CaptureOutcome, CaptureRequest, Decision};
use crate::core::labels::{LabelError, LabelReconciler, Reconciled, SharedLabelReconciler};
use crate::core::layout::{LayoutError, OutputLayout};
use crate::core::materialize::{
    materialize_labeled, materialize_unlabeled, segment_count, MaterializeError,
};
use crate::core::mode::{RecordingMode, SessionTarget};
use crate::core::stop::StopSignal;
use crate::session::handle::{SessionHandle, SessionState};
use crate::session::notice::{Notice, SessionEnd};
use crate::sink::{RecordSink, SinkError};
use crate::stats::{create_shared_stats, SharedSessionStats};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("please insert a task name")]
    EmptyTaskName,

    #[error("task name {0:?} must not contain path separators")]
    InvalidTaskName(String),

    #[error("choose a primitive for a primitive recording")]
    MissingPrimitive,

    #[error("no primitive categories available")]
    NoKnownPrimitives,

    #[error("unknown primitive {name:?}")]
    UnknownPrimitive { name: String },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Labels(#[from] LabelError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Persist(#[from] SinkError),
}

impl SessionError {
    pub fn is_hardware_unavailable(&self) -> bool {
        matches!(
            self,
            SessionError::Capture(CaptureError::HardwareUnavailable { .. })
        )
    }
}

/// What the operator asked to record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub task: String,
    pub mode: RecordingMode,
    /// Category folder; required in primitive mode, ignored otherwise
    pub primitive: Option<String>,
}

impl SessionRequest {
    pub fn primitive(task: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            mode: RecordingMode::Primitive,
            primitive: Some(category.into()),
        }
    }

    pub fn continuous(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            mode: RecordingMode::Continuous,
            primitive: None,
        }
    }
}

/// Optional safety limits; both waits are unbounded by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub capture_timeout: Option<Duration>,
    pub label_timeout: Option<Duration>,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub task: String,
    pub target: SessionTarget,
    pub first_attempt: u32,
    /// Attempt number the next session on this key would start from
    pub next_attempt: u32,
    pub attempts_saved: u32,
    pub saved: Vec<PathBuf>,
    pub end: SessionEnd,
}

/// Drives repeated capture attempts for one task at a time.
pub struct SessionController<E, S> {
    engine: E,
    sink: S,
    layout: OutputLayout,
    labels: SharedLabelReconciler,
    stats: SharedSessionStats,
    options: SessionOptions,
    known_primitives: Option<Vec<String>>,
    notices: Option<Sender<Notice>>,
    handle: SessionHandle,
}

impl<E: CaptureEngine, S: RecordSink> SessionController<E, S> {
    pub fn new(engine: E, sink: S, layout: OutputLayout) -> Self {
        Self {
            engine,
            sink,
            layout,
            labels: LabelReconciler::shared(),
            stats: create_shared_stats(),
            options: SessionOptions::default(),
            known_primitives: None,
            notices: None,
            handle: SessionHandle::new(),
        }
    }

    /// Use an existing reconciler, e.g. one already wired to an input handler.
    pub fn with_labels(mut self, labels: SharedLabelReconciler) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Restrict primitive categories to `categories` instead of the
    /// sub-folders found in the output directory.
    pub fn with_known_primitives(mut self, categories: Vec<String>) -> Self {
        self.known_primitives = Some(categories);
        self
    }

    pub fn with_notices(mut self, notices: Sender<Notice>) -> Self {
        self.notices = Some(notices);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn labels(&self) -> SharedLabelReconciler {
        self.labels.clone()
    }

    pub fn stats(&self) -> SharedSessionStats {
        self.stats.clone()
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Primitive categories a request may choose from.
    pub fn known_primitives(&self) -> Result<Vec<String>, SessionError> {
        match &self.known_primitives {
            Some(categories) => Ok(categories.clone()),
            None => Ok(self.layout.known_primitives()?),
        }
    }

    /// Check a request without touching the hardware.
    pub fn validate(&self, request: &SessionRequest) -> Result<SessionTarget, SessionError> {
        let task = request.task.trim();
        if task.is_empty() {
            return Err(SessionError::EmptyTaskName);
        }
        if task != request.task || task.contains(['/', '\\']) {
            return Err(SessionError::InvalidTaskName(request.task.clone()));
        }

        match request.mode {
            RecordingMode::Continuous => {
                if request.primitive.is_some() {
                    debug!("ignoring primitive for a continuous recording");
                }
                Ok(SessionTarget::Continuous)
            }
            RecordingMode::Primitive => {
                let category = request
                    .primitive
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or(SessionError::MissingPrimitive)?;
                let known = self.known_primitives()?;
                if known.is_empty() {
                    return Err(SessionError::NoKnownPrimitives);
                }
                if !known.iter().any(|k| k == category) {
                    return Err(SessionError::UnknownPrimitive {
                        name: category.to_string(),
                    });
                }
                Ok(SessionTarget::Primitive {
                    category: category.to_string(),
                })
            }
        }
    }

    /// Run a session until the operator quits, a stop arrives or something
    /// fails. The engine is released before this returns, whatever the
    /// outcome, and the controller can run another session afterwards.
    pub fn run(&mut self, request: &SessionRequest) -> Result<SessionSummary, SessionError> {
        let stop = self.handle.arm();
        let session_id = Uuid::new_v4();
        let span = info_span!("session", id = %session_id, task = %request.task);
        let _enter = span.enter();

        self.handle.set_state(SessionState::Starting);
        let result = self.drive(request, session_id, &stop);

        self.engine.stop();
        self.handle.disarm();

        match &result {
            Ok(summary) => {
                info!(
                    attempts = summary.attempts_saved,
                    end = ?summary.end,
                    "session finished"
                );
                self.emit(Notice::SessionEnded {
                    attempts_saved: summary.attempts_saved,
                    end: summary.end,
                });
            }
            Err(e) => {
                error!("session aborted: {e}");
                self.emit(Notice::Error(e.to_string()));
            }
        }

        if let Err(e) = self.stats.save() {
            warn!("could not save session stats: {e}");
        }

        result
    }

    fn drive(
        &mut self,
        request: &SessionRequest,
        session_id: Uuid,
        stop: &StopSignal,
    ) -> Result<SessionSummary, SessionError> {
        let target = self.validate(request)?;
        let task = request.task.as_str();

        // Numbered once per session; concurrent writers are not re-checked.
        let first_attempt = self.layout.next_attempt(&target, task)?;

        if stop.is_stopped() {
            info!("stop requested before the session started");
            return Ok(SessionSummary {
                session_id,
                task: task.to_string(),
                target,
                first_attempt,
                next_attempt: first_attempt,
                attempts_saved: 0,
                saved: Vec::new(),
                end: SessionEnd::Stopped,
            });
        }

        self.engine.start()?;
        self.stats.record_session_started();
        info!(%target, first_attempt, "session started");
        self.emit(Notice::SessionStarted {
            session_id,
            task: task.to_string(),
            target: target.clone(),
            first_attempt,
        });

        let mut attempt = first_attempt;
        let mut saved = Vec::new();

        let end = loop {
            let paths = self.layout.attempt_paths(&target, task, attempt);
            self.layout.ensure_target_dir(&target)?;

            self.handle.set_state(SessionState::Capturing { attempt });
            self.emit(Notice::AttemptStarted {
                attempt,
                raw_path: paths.raw.clone(),
            });

            let capture_request = CaptureRequest {
                task: task.to_string(),
                attempt,
                raw_path: paths.raw.clone(),
                timeout: self.options.capture_timeout,
            };
            let capture = match self.engine.capture_once(&capture_request, stop)? {
                CaptureOutcome::Captured(capture) => capture,
                CaptureOutcome::Interrupted => {
                    self.discard(attempt);
                    break SessionEnd::Stopped;
                }
            };
            debug!(attempt, markers = capture.raw.len(), epoch = capture.epoch, "captured");

            let records = match target.mode() {
                RecordingMode::Primitive => materialize_unlabeled(&capture.raw, capture.epoch)?,
                RecordingMode::Continuous => {
                    let segments = segment_count(&capture.raw)?;
                    self.handle.set_state(SessionState::Reconciling { attempt });
                    match self.reconcile(attempt, segments, stop)? {
                        Reconciled::Ready(labels) => {
                            materialize_labeled(&capture.raw, capture.epoch, &labels)?
                        }
                        Reconciled::Interrupted => {
                            self.discard(attempt);
                            break SessionEnd::Stopped;
                        }
                    }
                }
            };

            if stop.is_stopped() {
                self.discard(attempt);
                break SessionEnd::Stopped;
            }

            self.handle.set_state(SessionState::Persisting { attempt });
            self.sink.write_records(&paths.records, &records)?;
            self.stats.record_attempt_saved(records.len());
            info!(attempt, records = records.len(), path = %paths.records.display(), "attempt saved");
            self.emit(Notice::AttemptSaved {
                attempt,
                path: paths.records.clone(),
                records: records.len(),
                duration: capture.duration,
            });
            saved.push(paths.records);

            self.handle
                .set_state(SessionState::AwaitingDecision { attempt });
            attempt += 1;
            self.emit(Notice::AwaitingDecision);

            match self.engine.await_continue_or_quit(stop)? {
                Decision::Continue => continue,
                Decision::Quit if stop.is_stopped() => break SessionEnd::Stopped,
                Decision::Quit => break SessionEnd::Quit,
            }
        };

        Ok(SessionSummary {
            session_id,
            task: task.to_string(),
            target,
            first_attempt,
            next_attempt: attempt,
            attempts_saved: saved.len() as u32,
            saved,
            end,
        })
    }

    fn reconcile(
        &self,
        attempt: u32,
        segments: usize,
        stop: &StopSignal,
    ) -> Result<Reconciled, SessionError> {
        self.emit(Notice::AwaitingLabels { attempt, segments });

        let result = self
            .labels
            .reconcile(segments, stop, self.options.label_timeout, |mismatch| {
                warn!(
                    labels = mismatch.labels,
                    segments = mismatch.segments,
                    "label count does not match recorded segments"
                );
                self.stats.record_label_mismatch();
                self.emit(Notice::LabelMismatch(mismatch));
            })?;
        Ok(result)
    }

    fn discard(&self, attempt: u32) {
        info!(attempt, "stop requested, discarding attempt");
        self.stats.record_attempt_discarded();
        self.emit(Notice::AttemptDiscarded { attempt });
    }

    fn emit(&self, notice: Notice) {
        if let Some(notices) = &self.notices {
            // The receiving surface may have gone away; the session goes on.
            let _ = notices.send(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScriptedEngine;
    use crate::sink::CsvSink;
    use std::fs;
    use tempfile::TempDir;

    fn controller(
        dir: &TempDir,
        engine: ScriptedEngine,
    ) -> SessionController<ScriptedEngine, CsvSink> {
        SessionController::new(engine, CsvSink::new(), OutputLayout::new(dir.path()))
            .with_known_primitives(vec!["grasp".to_string(), "reach".to_string()])
    }

    #[test]
    fn test_validate_task_name() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, ScriptedEngine::new());

        assert!(matches!(
            ctl.validate(&SessionRequest::continuous("")),
            Err(SessionError::EmptyTaskName)
        ));
        assert!(matches!(
            ctl.validate(&SessionRequest::continuous("   ")),
            Err(SessionError::EmptyTaskName)
        ));
        assert!(matches!(
            ctl.validate(&SessionRequest::continuous("a/b")),
            Err(SessionError::InvalidTaskName(_))
        ));
        assert_eq!(
            ctl.validate(&SessionRequest::continuous("assembly")).unwrap(),
            SessionTarget::Continuous
        );
    }

    #[test]
    fn test_validate_primitive() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir, ScriptedEngine::new());

        let mut request = SessionRequest::primitive("pick", "grasp");
        assert_eq!(
            ctl.validate(&request).unwrap(),
            SessionTarget::Primitive {
                category: "grasp".to_string()
            }
        );

        request.primitive = Some("jump".to_string());
        assert!(matches!(
            ctl.validate(&request),
            Err(SessionError::UnknownPrimitive { .. })
        ));

        request.primitive = None;
        assert!(matches!(
            ctl.validate(&request),
            Err(SessionError::MissingPrimitive)
        ));
    }

    #[test]
    fn test_validate_without_categories() {
        let dir = TempDir::new().unwrap();
        let ctl = SessionController::new(
            ScriptedEngine::new(),
            CsvSink::new(),
            OutputLayout::new(dir.path()),
        );
        assert!(matches!(
            ctl.validate(&SessionRequest::primitive("pick", "grasp")),
            Err(SessionError::NoKnownPrimitives)
        ));
    }

    #[test]
    fn test_empty_task_never_starts_engine() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new().with_capture(vec![1, 2], 0);
        let script = engine.handle();
        let mut ctl = controller(&dir, engine);

        let err = ctl.run(&SessionRequest::continuous("")).unwrap_err();
        assert!(matches!(err, SessionError::EmptyTaskName));
        assert_eq!(script.snapshot().starts, 0);
        assert_eq!(ctl.handle().state(), SessionState::Idle);
    }

    #[test]
    fn test_primitive_attempts_are_numbered_sequentially() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new()
            .with_capture(vec![100, 200, 300, 500], 1000)
            .then(Decision::Continue)
            .with_capture(vec![7, 9], 0)
            .then(Decision::Quit);
        let script = engine.handle();
        let mut ctl = controller(&dir, engine);

        let summary = ctl.run(&SessionRequest::primitive("pick", "grasp")).unwrap();
        assert_eq!(summary.first_attempt, 1);
        assert_eq!(summary.next_attempt, 3);
        assert_eq!(summary.attempts_saved, 2);
        assert_eq!(summary.end, SessionEnd::Quit);

        let first = fs::read_to_string(dir.path().join("grasp/pick_1.csv")).unwrap();
        assert_eq!(first, "100000001000, 500000001000\n");
        let second = fs::read_to_string(dir.path().join("grasp/pick_2.csv")).unwrap();
        assert_eq!(second, "7000000, 9000000\n");

        let log = script.snapshot();
        assert_eq!(log.starts, 1);
        assert_eq!(log.releases, 1);
        assert_eq!(log.decisions_served, 2);
        assert_eq!(log.requests[1].raw_path, dir.path().join("grasp/pick_2.aedat"));
        assert_eq!(ctl.stats().snapshot().attempts_saved, 2);
    }

    #[test]
    fn test_empty_primitive_capture_aborts() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new().with_capture(vec![], 0);
        let script = engine.handle();
        let mut ctl = controller(&dir, engine);

        let err = ctl
            .run(&SessionRequest::primitive("pick", "grasp"))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Materialize(MaterializeError::EmptyCapture)
        ));
        assert!(!dir.path().join("grasp/pick_1.csv").exists());
        assert_eq!(script.snapshot().releases, 1);
    }

    #[test]
    fn test_odd_continuous_capture_aborts() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new().with_capture(vec![1, 2, 3], 0);
        let mut ctl = controller(&dir, engine);
        ctl.labels().confirm("1").unwrap();

        let err = ctl.run(&SessionRequest::continuous("assembly")).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Materialize(MaterializeError::MalformedSegments { len: 3 })
        ));
    }

    #[test]
    fn test_empty_continuous_capture_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new()
            .with_capture(vec![], 0)
            .then(Decision::Quit);
        let mut ctl = controller(&dir, engine);
        ctl.labels().confirm("1,2").unwrap();

        let summary = ctl.run(&SessionRequest::continuous("assembly")).unwrap();
        assert_eq!(summary.attempts_saved, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("assembly_1.csv")).unwrap(),
            ""
        );
        assert_eq!(ctl.stats().snapshot().label_mismatches, 0);
    }

    #[test]
    fn test_hardware_unavailable_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut ctl = controller(&dir, ScriptedEngine::unavailable("/dev/ttyACM0", "missing"))
            .with_notices(tx);

        let err = ctl.run(&SessionRequest::continuous("assembly")).unwrap_err();
        assert!(err.is_hardware_unavailable());

        let notices: Vec<Notice> = rx.try_iter().collect();
        assert!(matches!(notices.last(), Some(Notice::Error(m)) if m.contains("/dev/ttyACM0")));
    }

    #[test]
    fn test_stop_before_run_skips_hardware() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new()
            .with_capture(vec![1, 2], 0)
            .then(Decision::Quit);
        let script = engine.handle();
        let mut ctl = controller(&dir, engine);

        assert!(ctl.handle().stop());
        let summary = ctl.run(&SessionRequest::primitive("pick", "grasp")).unwrap();
        assert_eq!(summary.end, SessionEnd::Stopped);
        assert_eq!(summary.attempts_saved, 0);
        assert_eq!(script.snapshot().starts, 0);

        // The held stop is spent; the next session records normally.
        let summary = ctl.run(&SessionRequest::primitive("pick", "grasp")).unwrap();
        assert_eq!(summary.end, SessionEnd::Quit);
        assert_eq!(summary.attempts_saved, 1);
    }

    #[test]
    fn test_controller_reusable_after_session() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine::new()
            .with_capture(vec![1, 2], 0)
            .then(Decision::Quit)
            .with_capture(vec![3, 4], 0)
            .then(Decision::Quit);
        let script = engine.handle();
        let mut ctl = controller(&dir, engine);

        let first = ctl.run(&SessionRequest::primitive("pick", "reach")).unwrap();
        let second = ctl.run(&SessionRequest::primitive("pick", "reach")).unwrap();
        assert_eq!(first.first_attempt, 1);
        assert_eq!(second.first_attempt, 2);

        let log = script.snapshot();
        assert_eq!(log.starts, 2);
        assert_eq!(log.releases, 2);
    }
}
