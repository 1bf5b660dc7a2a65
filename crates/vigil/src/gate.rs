//
// gate.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The gate in front of the dangerous direct lock operations.
//!
//! Direct operations acquire a monitored lock without a timeout and leave
//! it held (or release it again), which is exactly what the rest of the
//! watchdog promises never to do. They exist for manual fault injection
//! (deliberately induce a hang to validate the watchdog) and for
//! operator-assisted recovery, and are refused unless explicitly enabled.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::probe::LockHandle;
use crate::registry::LockRegistry;

/// Selects the target of a direct lock operation.
#[derive(Clone, Debug, PartialEq)]
pub enum LockSelector {
    /// One fixed lock, by registered name.
    Fixed(String),
    /// The dynamic collection's own container lock.
    Container,
    /// Every currently enumerated member of the dynamic collection.
    Members,
}

#[derive(Debug, PartialEq)]
pub enum GateError {
    /// Dangerous commands are disabled.
    Disabled,
    /// No fixed lock is registered under this name.
    UnknownLock(String),
    /// No dynamic lock source is registered.
    DynamicUnavailable,
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::Disabled => write!(f, "dangerous freeze commands are disabled"),
            GateError::UnknownLock(name) => write!(f, "no monitored lock is named '{name}'"),
            GateError::DynamicUnavailable => write!(f, "no dynamic lock source is registered"),
        }
    }
}

impl std::error::Error for GateError {}

#[derive(Clone, Copy)]
enum DirectOp {
    Lock,
    Unlock,
}

impl DirectOp {
    fn verb(&self) -> &'static str {
        match self {
            DirectOp::Lock => "lock",
            DirectOp::Unlock => "unlock",
        }
    }

    fn state(&self) -> &'static str {
        match self {
            DirectOp::Lock => "LOCKED",
            DirectOp::Unlock => "UNLOCKED",
        }
    }
}

pub struct DangerousGate {
    enabled: AtomicBool,
    registry: Arc<LockRegistry>,
}

impl DangerousGate {
    /// Create a gate over `registry`. Disabled by default.
    pub fn new(registry: Arc<LockRegistry>) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            registry,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        log::warn!(
            "dangerous freeze commands {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Directly acquire the selected lock(s), leaving them held.
    pub fn lock_direct(&self, selector: &LockSelector) -> Result<(), GateError> {
        self.apply(selector, DirectOp::Lock)
    }

    /// Release lock(s) previously held via `lock_direct()`. Pairing with an
    /// earlier direct lock is the operator's responsibility.
    pub fn unlock_direct(&self, selector: &LockSelector) -> Result<(), GateError> {
        self.apply(selector, DirectOp::Unlock)
    }

    fn apply(&self, selector: &LockSelector, op: DirectOp) -> Result<(), GateError> {
        if !self.is_enabled() {
            log::warn!(
                "dangerous freeze commands are disabled; refusing to {} {selector:?}",
                op.verb()
            );
            return Err(GateError::Disabled);
        }

        match selector {
            LockSelector::Fixed(name) => {
                let Some(handle) = self.registry.find_fixed(name) else {
                    log::warn!("refusing to {} unknown lock '{name}'", op.verb());
                    return Err(GateError::UnknownLock(name.clone()));
                };

                Self::direct_op(handle, op);
                log::warn!("The '{}' lock is now {}", handle.name(), op.state());
                Ok(())
            },

            LockSelector::Container => {
                let Some(dynamic) = self.registry.dynamic() else {
                    log::warn!("refusing to {} the container lock: no dynamic lock source", op.verb());
                    return Err(GateError::DynamicUnavailable);
                };

                let handle = dynamic.container_handle();
                Self::direct_op(&handle, op);
                log::warn!("The '{}' lock is now {}", handle.name(), op.state());
                Ok(())
            },

            LockSelector::Members => {
                let Some(dynamic) = self.registry.dynamic() else {
                    log::warn!("refusing to {} collection members: no dynamic lock source", op.verb());
                    return Err(GateError::DynamicUnavailable);
                };

                let mut affected = 0;
                for handle in dynamic.source().members() {
                    if Self::direct_op(&handle, op) {
                        affected += 1;
                    }
                }

                log::warn!(
                    "All '{}' locks are now {} ({affected} affected)",
                    dynamic.name(),
                    op.state()
                );
                Ok(())
            },
        }
    }

    // Returns `false` when the member disappeared before the operation
    fn direct_op(handle: &LockHandle, op: DirectOp) -> bool {
        let Some(lock) = handle.resolve() else {
            log::debug!("skipping stale '{}' lock", handle.name());
            return false;
        };

        match op {
            DirectOp::Lock => lock.lock_unbounded(),
            // Safety: direct unlocks are only reachable through the gate,
            // whose contract makes the operator responsible for pairing
            DirectOp::Unlock => unsafe { lock.unlock_unbounded() },
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::fixtures::TestLockSet;

    fn gate_with_locks() -> (DangerousGate, Arc<Mutex<()>>, Arc<TestLockSet>) {
        let channels = Arc::new(Mutex::new(()));
        let queues = Arc::new(TestLockSet::new());
        queues.add("queue-a");
        queues.add("queue-b");

        let mut registry = LockRegistry::new();
        registry.register_fixed("channel", channels.clone());
        registry.register_dynamic("queue", queues.clone());

        (DangerousGate::new(Arc::new(registry)), channels, queues)
    }

    #[test]
    fn test_disabled_gate_refuses_direct_locks() {
        let (gate, channels, _queues) = gate_with_locks();

        assert_eq!(
            gate.lock_direct(&LockSelector::Fixed("channel".to_string())),
            Err(GateError::Disabled)
        );

        // And the lock was not touched
        assert!(channels.try_lock().is_some());
    }

    #[test]
    fn test_enabled_gate_locks_and_unlocks_fixed_lock() {
        let (gate, channels, _queues) = gate_with_locks();
        gate.set_enabled(true);

        let selector = LockSelector::Fixed("channel".to_string());

        gate.lock_direct(&selector).unwrap();
        assert!(channels.try_lock().is_none());

        gate.unlock_direct(&selector).unwrap();
        assert!(channels.try_lock().is_some());
    }

    #[test]
    fn test_unknown_lock_is_refused() {
        let (gate, _channels, _queues) = gate_with_locks();
        gate.set_enabled(true);

        assert_eq!(
            gate.lock_direct(&LockSelector::Fixed("nope".to_string())),
            Err(GateError::UnknownLock("nope".to_string()))
        );
    }

    #[test]
    fn test_container_lock_and_unlock() {
        let (gate, _channels, queues) = gate_with_locks();
        gate.set_enabled(true);

        gate.lock_direct(&LockSelector::Container).unwrap();
        assert!(queues.container_lock().try_lock().is_none());

        gate.unlock_direct(&LockSelector::Container).unwrap();
        assert!(queues.container_lock().try_lock().is_some());
    }

    #[test]
    fn test_member_bulk_lock_and_unlock() {
        let (gate, _channels, queues) = gate_with_locks();
        gate.set_enabled(true);

        gate.lock_direct(&LockSelector::Members).unwrap();
        for lock in queues.member_locks() {
            assert!(lock.try_lock().is_none());
        }

        gate.unlock_direct(&LockSelector::Members).unwrap();
        for lock in queues.member_locks() {
            assert!(lock.try_lock().is_some());
        }
    }

    #[test]
    fn test_dynamic_selectors_without_source_are_refused() {
        let mut registry = LockRegistry::new();
        registry.register_fixed("channel", Arc::new(Mutex::new(())));

        let gate = DangerousGate::new(Arc::new(registry));
        gate.set_enabled(true);

        assert_eq!(
            gate.lock_direct(&LockSelector::Container),
            Err(GateError::DynamicUnavailable)
        );
        assert_eq!(
            gate.lock_direct(&LockSelector::Members),
            Err(GateError::DynamicUnavailable)
        );
    }
}
