//
// commands.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

//! The administrative `freeze` command surface.
//!
//! Only the command shapes and reply strings live here; how command lines
//! reach the watchdog (console, management socket, ...) is the host's
//! concern. The first token is either a built-in verb or the registered
//! name of a monitored lock or collection.

use std::sync::Arc;
use std::time::Duration;

use crate::gate::DangerousGate;
use crate::gate::GateError;
use crate::gate::LockSelector;
use crate::registry::CheckOutcome;
use crate::registry::LockRegistry;

const USAGE: &str = "\
Usage: freeze {enable|disable|check}
       freeze <lock> {lock|unlock}
       freeze <collection> {global_lock|lock|global_unlock|unlock}";

/// A parsed `freeze` command.
#[derive(Clone, Debug, PartialEq)]
pub enum FreezeCommand {
    Enable,
    Disable,
    Check,
    Lock { name: String, scope: LockScope },
    Unlock { name: String, scope: LockScope },
}

/// Whether a lock/unlock command addresses the collection's container lock
/// (the `global_*` forms) or the named lock / all members.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LockScope {
    Direct,
    Global,
}

/// Reply to one administrative command.
#[derive(Debug, PartialEq)]
pub enum CommandOutcome {
    Success(String),
    Failure(String),
    Usage(String),
}

impl FreezeCommand {
    /// Parse the tokens of a command line, without the leading `freeze`
    /// word itself.
    pub fn parse(args: &[&str]) -> Option<FreezeCommand> {
        match args {
            ["enable"] => Some(FreezeCommand::Enable),
            ["disable"] => Some(FreezeCommand::Disable),
            ["check"] => Some(FreezeCommand::Check),
            [name, "lock"] => Some(FreezeCommand::Lock {
                name: name.to_string(),
                scope: LockScope::Direct,
            }),
            [name, "unlock"] => Some(FreezeCommand::Unlock {
                name: name.to_string(),
                scope: LockScope::Direct,
            }),
            [name, "global_lock"] => Some(FreezeCommand::Lock {
                name: name.to_string(),
                scope: LockScope::Global,
            }),
            [name, "global_unlock"] => Some(FreezeCommand::Unlock {
                name: name.to_string(),
                scope: LockScope::Global,
            }),
            _ => None,
        }
    }
}

/// Executes administrative `freeze` commands against the watchdog.
pub struct FreezeCommands {
    registry: Arc<LockRegistry>,
    gate: Arc<DangerousGate>,
    check_timeout: Duration,
}

impl FreezeCommands {
    pub(crate) fn new(
        registry: Arc<LockRegistry>,
        gate: Arc<DangerousGate>,
        check_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            gate,
            check_timeout,
        }
    }

    /// Parse and execute one command line, e.g. `"check"` or
    /// `"queue global_lock"`.
    pub fn dispatch(&self, line: &str) -> CommandOutcome {
        let args: Vec<&str> = line.split_whitespace().collect();

        match FreezeCommand::parse(&args) {
            Some(command) => self.execute(&command),
            None => CommandOutcome::Usage(USAGE.to_string()),
        }
    }

    pub fn execute(&self, command: &FreezeCommand) -> CommandOutcome {
        match command {
            FreezeCommand::Enable => {
                self.gate.set_enabled(true);
                CommandOutcome::Success("Dangerous freeze commands enabled.".to_string())
            },

            FreezeCommand::Disable => {
                self.gate.set_enabled(false);
                CommandOutcome::Success("Dangerous freeze commands disabled.".to_string())
            },

            FreezeCommand::Check => match self.registry.check_all(self.check_timeout) {
                CheckOutcome::Ok => {
                    CommandOutcome::Success("The process seems to be fine".to_string())
                },
                CheckOutcome::Fail => {
                    CommandOutcome::Failure("The process is most likely DEADLOCKED".to_string())
                },
            },

            FreezeCommand::Lock { name, scope } => self.direct(name, *scope, true),
            FreezeCommand::Unlock { name, scope } => self.direct(name, *scope, false),
        }
    }

    fn direct(&self, name: &str, scope: LockScope, lock: bool) -> CommandOutcome {
        let selector = match self.selector(name, scope) {
            Ok(selector) => selector,
            Err(outcome) => return outcome,
        };

        let result = if lock {
            self.gate.lock_direct(&selector)
        } else {
            self.gate.unlock_direct(&selector)
        };

        match result {
            Ok(()) => {
                let state = if lock { "LOCKED" } else { "UNLOCKED" };
                let message = match &selector {
                    LockSelector::Fixed(name) => format!("The '{name}' lock is now {state}."),
                    LockSelector::Container => {
                        format!("The '{name}' container lock is now {state}.")
                    },
                    LockSelector::Members => format!("All '{name}' locks are now {state}."),
                };
                CommandOutcome::Success(message)
            },
            Err(GateError::Disabled) => {
                CommandOutcome::Failure("Dangerous freeze commands are disabled.".to_string())
            },
            Err(err) => CommandOutcome::Failure(format!("{err}.")),
        }
    }

    fn selector(&self, name: &str, scope: LockScope) -> Result<LockSelector, CommandOutcome> {
        if self.registry.dynamic_named(name) {
            return Ok(match scope {
                LockScope::Global => LockSelector::Container,
                LockScope::Direct => LockSelector::Members,
            });
        }

        if scope == LockScope::Global {
            return Err(CommandOutcome::Failure(format!(
                "'{name}' is not a monitored collection."
            )));
        }

        if self.registry.find_fixed(name).is_some() {
            Ok(LockSelector::Fixed(name.to_string()))
        } else {
            Err(CommandOutcome::Failure(format!(
                "No monitored lock is named '{name}'."
            )))
        }
    }
}
