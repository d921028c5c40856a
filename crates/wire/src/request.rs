// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client → daemon request envelope.

use serde::{Deserialize, Serialize};

/// Upper bound on `look_up_array`'s name *count* (not name length — a name
/// itself is capped at 128 bytes separately), enforced by the listener
/// before it reaches the daemon core. Rejected with `BadCount`.
pub const MAX_LOOKUP_ARRAY: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Ambient version handshake, carried over from the teacher's protocol;
    /// doesn't touch the job graph.
    Hello { version: String },
    /// Ambient liveness check.
    Ping,

    CreateServer { command: Vec<String>, argv0: Option<String>, uid: u32, on_demand: bool },
    CreateService { name: String, on_demand: bool },
    CheckIn { name: String },
    Register { name: String, unregister: bool },
    LookUp { name: String },
    LookUpArray { names: Vec<String> },
    Status { name: String },
    Subset,
    Parent,
    Unprivileged,
    Info,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
