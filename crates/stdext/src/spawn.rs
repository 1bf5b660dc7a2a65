//
// spawn.rs
//
// Copyright (C) 2022 Posit Software, PBC. All rights reserved.
//
//

/// Spawns a named thread. Threads should always be named so that log
/// messages and crash reports can be attributed to the right subsystem.
#[macro_export]
macro_rules! spawn {
    ($name:expr, $body:expr) => {{
        std::thread::Builder::new()
            .name($name.to_string())
            .spawn($body)
            .unwrap()
    }};
}
