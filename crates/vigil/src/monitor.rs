//
// monitor.rs
//
// Copyright (C) 2025-2026 Posit Software, PBC. All rights reserved.
//
//

//! The assembled watchdog subsystem, owning the lifecycle of the periodic
//! checker and exposing the operator-facing entry points.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use crate::checker::AbortOnDeadlock;
use crate::checker::Checker;
use crate::checker::CheckerConfig;
use crate::checker::Escalation;
use crate::commands::FreezeCommands;
use crate::gate::DangerousGate;
use crate::registry::CheckOutcome;
use crate::registry::LockRegistry;
use crate::vigil_comm::CheckFreezeReplyParams;
use crate::vigil_comm::ResponseStatus;
use crate::vigil_comm::VigilBackendReply;
use crate::vigil_comm::VigilBackendRequest;

/// Default deadline for on-demand checks. Independent from the periodic
/// checker's `timeout` and typically much shorter, since on-demand checks
/// run on a request/response path.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

enum CheckerState {
    Idle,
    Running(Checker),
    Stopped,
}

/// The watchdog subsystem. Constructed at host startup, started once, and
/// stopped once at shutdown; a stopped monitor is inert and cannot be
/// restarted.
pub struct FreezeMonitor {
    config: CheckerConfig,
    check_timeout: Duration,
    registry: Arc<LockRegistry>,
    gate: Arc<DangerousGate>,
    escalation: Arc<dyn Escalation>,
    commands: FreezeCommands,
    state: CheckerState,
}

impl FreezeMonitor {
    /// Create a monitor that aborts the process on a detected deadlock.
    pub fn new(registry: LockRegistry, config: CheckerConfig) -> Self {
        Self::with_escalation(registry, config, Arc::new(AbortOnDeadlock))
    }

    /// Like [`FreezeMonitor::new`], with a custom escalation action. Tests
    /// record the escalation instead of aborting.
    pub fn with_escalation(
        registry: LockRegistry,
        config: CheckerConfig,
        escalation: Arc<dyn Escalation>,
    ) -> Self {
        if !registry.has_dynamic() {
            // Logged once here; the registry never retries
            log::warn!("no dynamic lock source registered; monitoring the fixed set only");
        }

        let registry = Arc::new(registry);
        let gate = Arc::new(DangerousGate::new(Arc::clone(&registry)));
        let commands = FreezeCommands::new(
            Arc::clone(&registry),
            Arc::clone(&gate),
            DEFAULT_CHECK_TIMEOUT,
        );

        Self {
            config,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            registry,
            gate,
            escalation,
            commands,
            state: CheckerState::Idle,
        }
    }

    /// Override the on-demand check deadline.
    pub fn set_check_timeout(&mut self, timeout: Duration) {
        self.check_timeout = timeout;
        self.commands = FreezeCommands::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.gate),
            timeout,
        );
    }

    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<DangerousGate> {
        &self.gate
    }

    pub fn commands(&self) -> &FreezeCommands {
        &self.commands
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CheckerState::Running(_))
    }

    /// Spawn the periodic checker thread.
    pub fn start(&mut self) -> anyhow::Result<()> {
        match self.state {
            CheckerState::Running(_) => return Err(anyhow!("the freeze checker is already running")),
            CheckerState::Stopped => return Err(anyhow!("the freeze checker has been stopped")),
            CheckerState::Idle => {},
        }

        log::info!(
            "starting the freeze checker (interval: {}s, timeout: {}s)",
            self.config.interval.as_secs_f64(),
            self.config.timeout.as_secs_f64()
        );

        self.state = CheckerState::Running(Checker::start(
            Arc::clone(&self.registry),
            self.config,
            Arc::clone(&self.escalation),
        ));

        Ok(())
    }

    /// Stop the periodic checker and wait for its thread to exit. A probe
    /// pass already in flight completes first.
    pub fn stop(&mut self) {
        let state = std::mem::replace(&mut self.state, CheckerState::Stopped);

        if let CheckerState::Running(checker) = state {
            checker.stop();
            log::info!("freeze checker stopped");
        }
    }

    /// Probe every monitored lock once, synchronously, with the on-demand
    /// deadline. Reporting-only: never escalates, safe to call from any
    /// thread, concurrently with the periodic checker and with itself.
    pub fn check_now(&self) -> CheckOutcome {
        self.registry.check_all(self.check_timeout)
    }

    /// Handle one remote-management request.
    pub fn handle_rpc(&self, request: VigilBackendRequest) -> VigilBackendReply {
        match request {
            VigilBackendRequest::CheckFreeze(params) => {
                let response = match self.check_now() {
                    CheckOutcome::Ok => ResponseStatus::Success,
                    CheckOutcome::Fail => ResponseStatus::Fail,
                };

                VigilBackendReply::CheckFreezeReply(CheckFreezeReplyParams {
                    response,
                    action_id: params.action_id,
                })
            },
        }
    }

    /// Handle one remote-management request in its wire encoding, the way
    /// transports that deal in raw JSON deliver it.
    pub fn handle_rpc_json(&self, request: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let request: VigilBackendRequest = serde_json::from_value(request)?;
        let reply = self.handle_rpc(request);
        Ok(serde_json::to_value(reply)?)
    }
}

impl Drop for FreezeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
