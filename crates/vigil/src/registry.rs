//
// registry.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The set of locks the watchdog monitors: a small fixed set of well-known
//! process-critical locks, plus an optional dynamically sized collection
//! supplied by the host.

use std::sync::Arc;
use std::time::Duration;

use crate::probe::LockHandle;
use crate::probe::ProbeOutcome;
use crate::probe::ProbedLock;

/// Capability supplied by the host when a dynamically sized collection of
/// locks should be monitored in addition to the fixed set.
///
/// Absence of this capability is a normal configuration state: the registry
/// then degrades to the fixed set for the process lifetime.
pub trait DynamicLockSource: Send + Sync {
    /// The collection's own container lock.
    fn container(&self) -> Arc<dyn ProbedLock>;

    /// Snapshot of the current members, one handle per live member.
    ///
    /// Implementations must use the collection's enumeration-safe
    /// mechanism: the snapshot must not block on the container lock (a
    /// stuck container is detected by probing it, not by hanging here) and
    /// must not yield the same live member twice.
    fn members(&self) -> Vec<LockHandle>;
}

pub struct LockRegistry {
    fixed: Vec<LockHandle>,
    dynamic: Option<DynamicSet>,
}

pub(crate) struct DynamicSet {
    name: String,
    source: Arc<dyn DynamicLockSource>,
}

impl DynamicSet {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn source(&self) -> &Arc<dyn DynamicLockSource> {
        &self.source
    }

    pub(crate) fn container_handle(&self) -> LockHandle {
        LockHandle::pinned(format!("{} container", self.name), self.source.container())
    }
}

/// Outcome of one full probe pass from the periodic checker.
#[derive(Debug, PartialEq)]
pub enum PassOutcome {
    /// Every handle was either acquired or failed non-fatally.
    Clean { probed: usize, errors: usize },
    /// A handle could not be acquired within the timeout.
    Deadlocked { name: String },
}

/// Result of an on-demand check.
#[derive(Debug, PartialEq)]
pub enum CheckOutcome {
    Ok,
    Fail,
}

#[derive(Default)]
struct ProbeReport {
    probed: usize,
    errors: usize,
    timed_out: Option<String>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            fixed: Vec::new(),
            dynamic: None,
        }
    }

    /// Register a well-known process-critical lock. Fixed locks are probed
    /// first, in registration order.
    pub fn register_fixed(&mut self, name: impl Into<String>, lock: Arc<dyn ProbedLock>) {
        self.fixed.push(LockHandle::pinned(name, lock));
    }

    /// Register the host's dynamic collection under `name`.
    pub fn register_dynamic(&mut self, name: impl Into<String>, source: Arc<dyn DynamicLockSource>) {
        self.dynamic = Some(DynamicSet {
            name: name.into(),
            source,
        });
    }

    pub fn has_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }

    pub(crate) fn dynamic(&self) -> Option<&DynamicSet> {
        self.dynamic.as_ref()
    }

    pub(crate) fn dynamic_named(&self, name: &str) -> bool {
        self.dynamic.as_ref().is_some_and(|dynamic| dynamic.name == name)
    }

    pub(crate) fn find_fixed(&self, name: &str) -> Option<&LockHandle> {
        self.fixed.iter().find(|handle| handle.name() == name)
    }

    /// Materialize a point-in-time snapshot of every monitored handle, in
    /// probe order: the fixed set first, then the dynamic container lock,
    /// then the current members. Members added after this call are not part
    /// of the snapshot; members removed concurrently probe as stale.
    pub fn enumerate(&self) -> Vec<LockHandle> {
        let mut handles = self.fixed.clone();

        if let Some(dynamic) = &self.dynamic {
            handles.push(dynamic.container_handle());
            handles.extend(dynamic.source.members());
        }

        handles
    }

    /// One probe pass for the periodic checker. Probe errors are logged and
    /// skipped so that an isolated probing malfunction cannot mask a real
    /// deadlock on the remaining locks; the first timeout abandons the rest
    /// of the pass.
    pub fn watch_pass(&self, timeout: Duration) -> PassOutcome {
        let mut report = ProbeReport::default();
        self.probe_handles(timeout, false, &mut report);

        match report.timed_out {
            Some(name) => PassOutcome::Deadlocked { name },
            None => PassOutcome::Clean {
                probed: report.probed,
                errors: report.errors,
            },
        }
    }

    /// One synchronous on-demand check: fails on the first timeout or
    /// error. Reporting-only, never escalates.
    pub fn check_all(&self, timeout: Duration) -> CheckOutcome {
        let mut report = ProbeReport::default();
        self.probe_handles(timeout, true, &mut report);

        if report.timed_out.is_some() || report.errors > 0 {
            CheckOutcome::Fail
        } else {
            CheckOutcome::Ok
        }
    }

    fn probe_handles(&self, timeout: Duration, stop_on_error: bool, report: &mut ProbeReport) {
        for handle in &self.fixed {
            if !Self::probe_step(handle, timeout, stop_on_error, report) {
                return;
            }
        }

        let Some(dynamic) = &self.dynamic else {
            return;
        };

        // The container lock is probed before the members so that a stuck
        // container is detected here rather than hung on while snapshotting
        let container = dynamic.container_handle();
        if !Self::probe_step(&container, timeout, stop_on_error, report) {
            return;
        }

        for handle in dynamic.source.members() {
            if !Self::probe_step(&handle, timeout, stop_on_error, report) {
                return;
            }
        }
    }

    // Returns `false` when the pass should stop
    fn probe_step(
        handle: &LockHandle,
        timeout: Duration,
        stop_on_error: bool,
        report: &mut ProbeReport,
    ) -> bool {
        report.probed += 1;

        match handle.probe(timeout) {
            ProbeOutcome::Acquired => true,
            ProbeOutcome::Error(err) => {
                log::error!("error while probing the '{}' lock: {err}", handle.name());
                report.errors += 1;
                !stop_on_error
            },
            ProbeOutcome::TimedOut => {
                log::error!(
                    "failed to acquire the '{}' lock in under {} seconds",
                    handle.name(),
                    timeout.as_secs_f64()
                );
                report.timed_out = Some(handle.name().to_string());
                false
            },
        }
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
