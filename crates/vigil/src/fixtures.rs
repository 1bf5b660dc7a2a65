//
// fixtures.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Test utilities shared by the unit tests and the scenario tests in
//! `tests/`.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;
use parking_lot::Mutex;

use crate::checker::Escalation;
use crate::probe::LockHandle;
use crate::probe::ProbedLock;
use crate::registry::DynamicLockSource;

/// A host-style dynamic collection of named locks, mutable concurrently
/// with enumeration.
pub struct TestLockSet {
    container: Arc<Mutex<()>>,
    members: Mutex<Vec<(String, Arc<Mutex<()>>)>>,
}

impl TestLockSet {
    pub fn new() -> Self {
        Self {
            container: Arc::new(Mutex::new(())),
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, name: &str) -> Arc<Mutex<()>> {
        let lock = Arc::new(Mutex::new(()));
        self.members.lock().push((name.to_string(), lock.clone()));
        lock
    }

    pub fn remove(&self, name: &str) {
        self.members.lock().retain(|(member, _)| member != name);
    }

    pub fn container_lock(&self) -> Arc<Mutex<()>> {
        self.container.clone()
    }

    pub fn member_locks(&self) -> Vec<Arc<Mutex<()>>> {
        self.members
            .lock()
            .iter()
            .map(|(_, lock)| lock.clone())
            .collect()
    }
}

impl Default for TestLockSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicLockSource for TestLockSet {
    fn container(&self) -> Arc<dyn ProbedLock> {
        self.container.clone()
    }

    fn members(&self) -> Vec<LockHandle> {
        self.members
            .lock()
            .iter()
            .map(|(name, lock)| {
                let lock: Arc<dyn ProbedLock> = lock.clone();
                let weak: Weak<dyn ProbedLock> = Arc::downgrade(&lock);
                LockHandle::tracked(name.clone(), weak)
            })
            .collect()
    }
}

/// An escalation that records each detection instead of aborting.
pub struct RecordingEscalation {
    detections: Mutex<Vec<String>>,
}

impl RecordingEscalation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            detections: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.detections.lock().len()
    }

    pub fn detections(&self) -> Vec<String> {
        self.detections.lock().clone()
    }
}

impl Escalation for RecordingEscalation {
    fn deadlocked(&self, name: &str) {
        self.detections.lock().push(name.to_string());
    }
}

/// A lock that counts successful timed acquisitions, for observing how many
/// probe passes touched it.
pub struct CountingLock {
    inner: Mutex<()>,
    acquisitions: AtomicUsize,
}

impl CountingLock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(()),
            acquisitions: AtomicUsize::new(0),
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl Default for CountingLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbedLock for CountingLock {
    fn acquire_timed(&self, timeout: Duration) -> bool {
        let acquired = self.inner.acquire_timed(timeout);
        if acquired {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
        }
        acquired
    }

    fn lock_unbounded(&self) {
        self.inner.lock_unbounded();
    }

    unsafe fn unlock_unbounded(&self) {
        self.inner.unlock_unbounded();
    }
}

/// A lock whose timed acquisition takes a fixed amount of time before
/// succeeding, to make probe passes observably long.
pub struct SlowLock {
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowLock {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ProbedLock for SlowLock {
    fn acquire_timed(&self, _timeout: Duration) -> bool {
        self.started.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.finished.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn lock_unbounded(&self) {}

    unsafe fn unlock_unbounded(&self) {}
}

/// Hold `lock` on a background thread for `duration`. Only returns once the
/// lock is actually held, so probes started afterwards are guaranteed to
/// contend.
pub fn hold_for(lock: Arc<Mutex<()>>, duration: Duration) -> JoinHandle<()> {
    let (held_tx, held_rx) = bounded::<()>(0);

    let handle = stdext::spawn!("test-lock-holder", move || {
        let guard = lock.lock();
        held_tx.send(()).unwrap();
        std::thread::sleep(duration);
        drop(guard);
    });

    held_rx.recv().unwrap();
    handle
}
