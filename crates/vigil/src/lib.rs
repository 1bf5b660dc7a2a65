//
// lib.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

pub mod cancel;
pub mod checker;
pub mod commands;
pub mod fixtures;
pub mod gate;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod vigil_comm;

pub const VIGIL_VERSION: &str = env!("CARGO_PKG_VERSION");
