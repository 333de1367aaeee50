//! Cross-thread handle onto a running session.

use crate::core::stop::{stop_pair, StopSignal, StopTrigger};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Where the session driver currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Starting,
    Capturing { attempt: u32 },
    Reconciling { attempt: u32 },
    Persisting { attempt: u32 },
    AwaitingDecision { attempt: u32 },
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    trigger: Option<StopTrigger>,
    /// Stop requested while no session was armed
    pending_stop: bool,
}

/// Cloneable handle used to observe and stop a session from other threads.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Inner>>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                trigger: None,
                pending_stop: false,
            })),
        }
    }

    /// Ask the session to stop.
    ///
    /// When no session is armed yet the request is held and the next session
    /// stops as soon as it starts. Returns `true` only for the call that
    /// actually requested the stop, so repeated calls are harmless.
    pub fn stop(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.trigger.as_mut() {
            Some(trigger) if !trigger.has_fired() => {
                trigger.fire();
                true
            }
            Some(_) => false,
            None => !std::mem::replace(&mut inner.pending_stop, true),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Idle
    }

    /// Install a fresh stop trigger for a new session, firing it at once
    /// when a stop is pending.
    pub(crate) fn arm(&self) -> StopSignal {
        let (mut trigger, signal) = stop_pair();
        let mut inner = self.lock();
        if std::mem::take(&mut inner.pending_stop) {
            trigger.fire();
        }
        inner.trigger = Some(trigger);
        signal
    }

    pub(crate) fn disarm(&self) {
        let mut inner = self.lock();
        inner.trigger = None;
        inner.state = SessionState::Idle;
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.lock().state = state;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_before_arm_is_held() {
        let handle = SessionHandle::new();
        assert!(handle.stop());
        assert!(!handle.stop());
        assert_eq!(handle.state(), SessionState::Idle);

        let signal = handle.arm();
        assert!(signal.is_stopped());
        assert!(!handle.stop());
        handle.disarm();

        // Consumed by the session it stopped
        let next = handle.arm();
        assert!(!next.is_stopped());
    }

    #[test]
    fn test_stop_fires_once() {
        let handle = SessionHandle::new();
        let signal = handle.arm();
        handle.set_state(SessionState::Capturing { attempt: 1 });
        assert!(handle.is_active());

        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(signal.is_stopped());

        handle.disarm();
        assert!(!handle.is_active());
    }

    #[test]
    fn test_rearm_gives_fresh_signal() {
        let handle = SessionHandle::new();
        let first = handle.arm();
        handle.stop();
        handle.disarm();

        let second = handle.arm();
        assert!(first.is_stopped());
        assert!(!second.is_stopped());
    }
}
