//
// checker.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The periodic probe-and-escalate loop.
//!
//! One background thread wakes up every `interval`, probes every monitored
//! lock with a bounded `timeout`, and escalates on the first timeout. A
//! probe pass is never interrupted: cancellation is observed only between
//! passes, so shutdown latency is bounded by one pass plus the in-flight
//! sleep.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use stdext::spawn;

use crate::cancel::CancellationSignal;
use crate::cancel::WaitOutcome;
use crate::registry::LockRegistry;
use crate::registry::PassOutcome;

/// Periodic checker configuration.
///
/// `timeout` should be strictly smaller than `interval`: a larger value
/// makes probe passes overlap their schedule (the next pass still only
/// starts once the current one finishes, so this is a drift, not a race).
#[derive(Clone, Copy, Debug)]
pub struct CheckerConfig {
    /// Wait between probe passes.
    pub interval: Duration,
    /// Per-lock acquisition deadline within one pass.
    pub timeout: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

/// The fatal response to a detected presumptive deadlock. The checker only
/// reports the detection; the installed escalation decides what termination
/// means for the host.
pub trait Escalation: Send + Sync {
    fn deadlocked(&self, name: &str);
}

/// Grace period between the escalation log line and the abort, so the log
/// sink has a chance to drain.
const ESCALATION_GRACE: Duration = Duration::from_secs(2);

/// Production escalation: flush the log, wait out the grace period, then
/// abort so the supervisor restarts the process.
pub struct AbortOnDeadlock;

impl Escalation for AbortOnDeadlock {
    fn deadlocked(&self, _name: &str) {
        log::logger().flush();
        std::thread::sleep(ESCALATION_GRACE);
        std::process::abort();
    }
}

/// A running periodic checker. Dropping without `stop()` detaches the
/// thread; `stop()` raises cancellation and joins.
pub struct Checker {
    cancel: Arc<CancellationSignal>,
    handle: JoinHandle<()>,
}

impl Checker {
    /// Spawn the background checker thread and start ticking.
    pub fn start(
        registry: Arc<LockRegistry>,
        config: CheckerConfig,
        escalation: Arc<dyn Escalation>,
    ) -> Self {
        let cancel = Arc::new(CancellationSignal::new());

        let loop_cancel = Arc::clone(&cancel);
        let handle = spawn!("freeze-checker", move || {
            run_loop(registry, config, loop_cancel, escalation)
        });

        Self { cancel, handle }
    }

    /// Raise cancellation and block until the checker thread has exited. A
    /// probe pass already in flight always completes first.
    pub fn stop(self) {
        self.cancel.raise();
        if self.handle.join().is_err() {
            log::error!("freeze checker thread panicked");
        }
    }
}

fn run_loop(
    registry: Arc<LockRegistry>,
    config: CheckerConfig,
    cancel: Arc<CancellationSignal>,
    escalation: Arc<dyn Escalation>,
) {
    log::trace!("freeze checker thread started");

    loop {
        // Cancellation is observed here and only here, never mid-pass
        match cancel.wait_timeout(config.interval) {
            WaitOutcome::Signalled => break,
            WaitOutcome::TimedOut => {},
        }

        match registry.watch_pass(config.timeout) {
            PassOutcome::Clean { probed, errors } => {
                log::debug!("probe pass completed: {probed} locks probed, {errors} errors");
            },
            PassOutcome::Deadlocked { name } => {
                log::error!("the process is most likely deadlocked: aborting");
                escalation.deadlocked(&name);
                break;
            },
        }
    }

    log::trace!("freeze checker thread exiting");
}
