//! Scripted capture engine.
//!
//! Replays a fixed queue of captures and button decisions instead of talking
//! to hardware. Used by the test suite and the demo, and handy for dry runs
//! of the output layout.

use crate::capture::types::{
    Capture, CaptureEngine, CaptureError, CaptureOutcome, CaptureRequest, Decision,
};
use crate::core::stop::StopSignal;
use crossbeam_channel::select;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// One scripted answer to `capture_once`.
#[derive(Debug, Clone)]
pub enum ScriptedCapture {
    Capture(Capture),
    Fail(CaptureError),
    /// Block until the session is stopped.
    Hang,
}

/// What the engine was asked to do, for assertions after the engine has
/// been moved into a controller.
#[derive(Debug, Default, Clone)]
pub struct ScriptLog {
    pub starts: usize,
    /// Number of `stop` calls that actually released the link
    pub releases: usize,
    pub requests: Vec<CaptureRequest>,
    pub decisions_served: usize,
}

/// Shared view of a [`ScriptLog`].
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle(Arc<Mutex<ScriptLog>>);

impl ScriptHandle {
    pub fn snapshot(&self) -> ScriptLog {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptLog> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Engine answering from queues.
///
/// When the capture queue runs dry it behaves like idle hardware and blocks
/// until stopped; when the decision queue runs dry the answer is
/// [`Decision::Quit`].
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    start_error: Option<CaptureError>,
    captures: VecDeque<ScriptedCapture>,
    decisions: VecDeque<Decision>,
    running: bool,
    log: ScriptHandle,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail as if the board were missing.
    pub fn unavailable(device: &str, reason: &str) -> Self {
        Self {
            start_error: Some(CaptureError::HardwareUnavailable {
                device: device.to_string(),
                reason: reason.to_string(),
            }),
            ..Self::default()
        }
    }

    pub fn with_capture(mut self, raw: Vec<u64>, epoch: i64) -> Self {
        self.captures
            .push_back(ScriptedCapture::Capture(Capture::new(raw, epoch)));
        self
    }

    pub fn with_failure(mut self, error: CaptureError) -> Self {
        self.captures.push_back(ScriptedCapture::Fail(error));
        self
    }

    pub fn with_hang(mut self) -> Self {
        self.captures.push_back(ScriptedCapture::Hang);
        self
    }

    pub fn then(mut self, decision: Decision) -> Self {
        self.decisions.push_back(decision);
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        self.log.clone()
    }
}

impl CaptureEngine for ScriptedEngine {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running {
            return Err(CaptureError::AlreadyRunning);
        }
        if let Some(error) = &self.start_error {
            return Err(error.clone());
        }
        self.running = true;
        self.log.lock().starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.log.lock().releases += 1;
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn capture_once(
        &mut self,
        request: &CaptureRequest,
        stop: &StopSignal,
    ) -> Result<CaptureOutcome, CaptureError> {
        if !self.running {
            return Err(CaptureError::NotRunning);
        }
        self.log.lock().requests.push(request.clone());

        match self.captures.pop_front().unwrap_or(ScriptedCapture::Hang) {
            ScriptedCapture::Capture(capture) => Ok(CaptureOutcome::Captured(capture)),
            ScriptedCapture::Fail(error) => Err(error),
            ScriptedCapture::Hang => {
                let deadline = request
                    .timeout
                    .map(crossbeam_channel::after)
                    .unwrap_or_else(crossbeam_channel::never);
                select! {
                    recv(stop.receiver()) -> _ => Ok(CaptureOutcome::Interrupted),
                    recv(deadline) -> _ => {
                        Err(CaptureError::TimedOut(request.timeout.unwrap_or_default()))
                    }
                }
            }
        }
    }

    fn await_continue_or_quit(&mut self, stop: &StopSignal) -> Result<Decision, CaptureError> {
        if !self.running {
            return Err(CaptureError::NotRunning);
        }
        if stop.is_stopped() {
            return Ok(Decision::Quit);
        }
        self.log.lock().decisions_served += 1;
        Ok(self.decisions.pop_front().unwrap_or(Decision::Quit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stop::stop_pair;
    use std::path::PathBuf;
    use std::time::Duration;

    fn request() -> CaptureRequest {
        CaptureRequest {
            task: "pick".to_string(),
            attempt: 1,
            raw_path: PathBuf::from("pick_1.aedat"),
            timeout: None,
        }
    }

    #[test]
    fn test_replays_queue() {
        let mut engine = ScriptedEngine::new()
            .with_capture(vec![1, 2], 5)
            .with_failure(CaptureError::Disconnected)
            .then(Decision::Continue);
        let handle = engine.handle();
        let stop = StopSignal::never();

        engine.start().unwrap();
        let outcome = engine.capture_once(&request(), &stop).unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured(c) if c.raw == vec![1, 2]));
        assert_eq!(
            engine.await_continue_or_quit(&stop).unwrap(),
            Decision::Continue
        );
        assert_eq!(
            engine.capture_once(&request(), &stop),
            Err(CaptureError::Disconnected)
        );
        assert_eq!(engine.await_continue_or_quit(&stop).unwrap(), Decision::Quit);

        engine.stop();
        engine.stop();
        let log = handle.snapshot();
        assert_eq!(log.starts, 1);
        assert_eq!(log.releases, 1);
        assert_eq!(log.requests.len(), 2);
    }

    #[test]
    fn test_hang_until_stopped() {
        let mut engine = ScriptedEngine::new().with_hang();
        engine.start().unwrap();

        let (mut trigger, signal) = stop_pair();
        trigger.fire();
        assert_eq!(
            engine.capture_once(&request(), &signal).unwrap(),
            CaptureOutcome::Interrupted
        );
    }

    #[test]
    fn test_hang_times_out() {
        let mut engine = ScriptedEngine::new();
        engine.start().unwrap();

        let mut req = request();
        req.timeout = Some(Duration::from_millis(10));
        assert_eq!(
            engine.capture_once(&req, &StopSignal::never()),
            Err(CaptureError::TimedOut(Duration::from_millis(10)))
        );
    }

    #[test]
    fn test_unavailable() {
        let mut engine = ScriptedEngine::unavailable("/dev/ttyACM0", "not found");
        assert!(matches!(
            engine.start(),
            Err(CaptureError::HardwareUnavailable { .. })
        ));
        assert!(!engine.is_running());
    }
}
