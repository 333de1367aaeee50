//! One-shot stop signal shared by every blocking wait in a session.
//!
//! The signal is a channel that never carries a message: firing the trigger
//! drops the only sender, which disconnects the channel and wakes every
//! receiver currently parked in a `select!`.

use crossbeam_channel::{bounded, never, Receiver, Sender, TryRecvError};

/// Receiving half, cloned into every wait that must be interruptible.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: never() }
    }

    /// Channel to use in a `crossbeam_channel::select!` arm. The arm becomes
    /// ready once the trigger has fired.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Check without blocking.
    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Sending half. Firing is idempotent.
#[derive(Debug)]
pub struct StopTrigger {
    tx: Option<Sender<()>>,
}

impl StopTrigger {
    pub fn fire(&mut self) {
        self.tx.take();
    }

    pub fn has_fired(&self) -> bool {
        self.tx.is_none()
    }
}

/// Create a connected trigger/signal pair.
pub fn stop_pair() -> (StopTrigger, StopSignal) {
    let (tx, rx) = bounded(0);
    (StopTrigger { tx: Some(tx) }, StopSignal { rx })
}
