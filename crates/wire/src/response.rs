// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon → client response envelope.

use serde::{Deserialize, Serialize};

use crate::status::{ServiceStatus, StatusCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupArrayResult {
    pub name: String,
    pub port: Option<u64>,
    pub status: StatusCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Hello { version: String },
    Pong,
    Ok,
    Error { status: StatusCode },
    /// A minted port name — the result of `create_service`, `check_in`,
    /// `look_up`, `register`, or `unprivileged`.
    Port { name: u64 },
    LookUpArray { results: Vec<LookupArrayResult> },
    Status { status: ServiceStatus },
    Job { job: String },
    /// Three parallel arrays: service names, their owning program names, and
    /// their activity statuses, gathered by walking from the caller's Job up
    /// through every ancestor.
    Info { names: Vec<String>, programs: Vec<String>, statuses: Vec<ServiceStatus> },
}

impl Response {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            Response::Ok
        } else {
            Response::Error { status }
        }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
