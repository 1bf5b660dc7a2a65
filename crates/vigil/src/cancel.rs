//
// cancel.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

use std::time::Duration;

use crossbeam::channel::bounded;
use crossbeam::channel::Receiver;
use crossbeam::channel::RecvTimeoutError;
use crossbeam::channel::Sender;
use parking_lot::Mutex;

/// A single-shot, idempotent wake primitive. One controller thread raises
/// the signal; the checker thread waits on it with a timeout so that
/// shutdown interrupts the sleep between probe passes.
///
/// Raising works by dropping the sender half of a channel: disconnection is
/// permanent and wakes every current and future waiter, which gives the
/// "once raised, always signalled" contract for free.
pub struct CancellationSignal {
    raise_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
}

#[derive(Debug, PartialEq)]
pub enum WaitOutcome {
    Signalled,
    TimedOut,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (raise_tx, wake_rx) = bounded::<()>(0);
        Self {
            raise_tx: Mutex::new(Some(raise_tx)),
            wake_rx,
        }
    }

    /// Raise the signal. Subsequent calls are no-ops.
    pub fn raise(&self) {
        self.raise_tx.lock().take();
    }

    pub fn is_raised(&self) -> bool {
        self.raise_tx.lock().is_none()
    }

    /// Block for up to `timeout`, returning early if the signal is (or has
    /// ever been) raised.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        match self.wake_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            // Disconnection means `raise()` dropped the sender; nothing is
            // ever actually sent on the channel
            Ok(()) | Err(RecvTimeoutError::Disconnected) => WaitOutcome::Signalled,
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
