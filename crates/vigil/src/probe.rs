//
// probe.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! Timed probing of host-owned locks.
//!
//! A probe is a bounded-time attempt to acquire a lock that is released
//! immediately on success. Non-acquisition within the deadline is the
//! deadlock signal the rest of the watchdog acts on.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;

/// Timed access to one lock. Object-safe so that handles over locks
/// guarding different data types can be probed uniformly.
///
/// The unbounded entry points exist solely for the dangerous direct
/// lock/unlock commands; everything else in the watchdog goes through
/// `acquire_timed()`.
pub trait ProbedLock: Send + Sync {
    /// Block until the lock is acquired or `timeout` elapses. An acquired
    /// lock is released before returning.
    fn acquire_timed(&self, timeout: Duration) -> bool;

    /// Unbounded acquisition that leaves the lock held.
    fn lock_unbounded(&self);

    /// Release a lock held via `lock_unbounded()`.
    ///
    /// # Safety
    ///
    /// The lock must currently be held as the result of an earlier
    /// `lock_unbounded()` call.
    unsafe fn unlock_unbounded(&self);
}

impl<T: Send> ProbedLock for Mutex<T> {
    fn acquire_timed(&self, timeout: Duration) -> bool {
        match self.try_lock_for(timeout) {
            Some(guard) => {
                drop(guard);
                true
            },
            None => false,
        }
    }

    fn lock_unbounded(&self) {
        // Deliberately leaked; `unlock_unbounded()` is the other half
        std::mem::forget(self.lock());
    }

    unsafe fn unlock_unbounded(&self) {
        self.force_unlock();
    }
}

/// Outcome of probing one lock.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The lock was acquired, and immediately released.
    Acquired,
    /// The deadline elapsed before the lock could be acquired. This is the
    /// presumptive-deadlock signal.
    TimedOut,
    /// The probe failed for a reason unrelated to contention. Never treated
    /// as deadlock evidence.
    Error(ProbeError),
}

#[derive(Debug, PartialEq)]
pub enum ProbeError {
    /// The lock was removed from its collection between enumeration and the
    /// probe.
    StaleHandle,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::StaleHandle => write!(f, "the monitored lock no longer exists"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// A named handle on one monitored lock. Handles borrow the lock from the
/// host; the watchdog is never responsible for the lock's lifetime.
#[derive(Clone)]
pub struct LockHandle {
    name: String,
    target: LockTarget,
}

#[derive(Clone)]
enum LockTarget {
    /// Fixed-set locks are kept alive by the host for the process lifetime.
    Pinned(Arc<dyn ProbedLock>),
    /// Dynamic-set members can be removed by the host at any time.
    Tracked(Weak<dyn ProbedLock>),
}

impl LockHandle {
    pub fn pinned(name: impl Into<String>, lock: Arc<dyn ProbedLock>) -> Self {
        Self {
            name: name.into(),
            target: LockTarget::Pinned(lock),
        }
    }

    pub fn tracked(name: impl Into<String>, lock: Weak<dyn ProbedLock>) -> Self {
        Self {
            name: name.into(),
            target: LockTarget::Tracked(lock),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempt to acquire the lock within `timeout`. The lock is never left
    /// held: on acquisition it is released before this returns.
    pub fn probe(&self, timeout: Duration) -> ProbeOutcome {
        log::debug!(
            "Testing if the '{}' lock can be acquired in under {} seconds",
            self.name,
            timeout.as_secs_f64()
        );

        let outcome = match self.resolve() {
            Some(lock) => {
                if lock.acquire_timed(timeout) {
                    ProbeOutcome::Acquired
                } else {
                    ProbeOutcome::TimedOut
                }
            },
            None => ProbeOutcome::Error(ProbeError::StaleHandle),
        };

        log::debug!("Test of the '{}' lock completed", self.name);

        outcome
    }

    pub(crate) fn resolve(&self) -> Option<Arc<dyn ProbedLock>> {
        match &self.target {
            LockTarget::Pinned(lock) => Some(Arc::clone(lock)),
            LockTarget::Tracked(lock) => lock.upgrade(),
        }
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use stdext::assert_match;

    use super::*;
    use crate::fixtures::hold_for;

    #[test]
    fn test_probe_acquires_and_releases() {
        let lock = Arc::new(Mutex::new(()));
        let handle = LockHandle::pinned("test", lock.clone());

        // Repeated probing must never leave the lock held
        for _ in 0..3 {
            assert_match!(handle.probe(Duration::from_secs(1)), ProbeOutcome::Acquired);
            assert!(lock.try_lock().is_some());
        }
    }

    #[test]
    fn test_probe_times_out_on_held_lock() {
        let lock = Arc::new(Mutex::new(()));
        let handle = LockHandle::pinned("held", lock.clone());
        let holder = hold_for(lock, Duration::from_millis(600));

        let now = Instant::now();
        assert_match!(
            handle.probe(Duration::from_millis(100)),
            ProbeOutcome::TimedOut
        );

        // The probe must block for the full deadline, plus scheduling
        // slack, but must not wait for the holder to let go at 600ms
        let elapsed = now.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));

        holder.join().unwrap();
    }

    #[test]
    fn test_probe_stale_handle_is_an_error() {
        let lock: Arc<dyn ProbedLock> = Arc::new(Mutex::new(()));
        let weak: Weak<dyn ProbedLock> = Arc::downgrade(&lock);
        let handle = LockHandle::tracked("stale", weak);
        drop(lock);

        assert_match!(
            handle.probe(Duration::from_secs(1)),
            ProbeOutcome::Error(ProbeError::StaleHandle)
        );
    }

    #[test]
    fn test_unbounded_lock_and_unlock() {
        let lock = Arc::new(Mutex::new(()));
        let probed: Arc<dyn ProbedLock> = lock.clone();

        probed.lock_unbounded();
        assert!(lock.try_lock().is_none());

        unsafe { probed.unlock_unbounded() };
        assert!(lock.try_lock().is_some());
    }
}
