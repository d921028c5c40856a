// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level status codes. Serialized as a bare integer, matching the
//! `kern_return_t`-style codes bootstrap clients expect.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    pub const NOT_PRIVILEGED: StatusCode = StatusCode(1100);
    pub const NAME_IN_USE: StatusCode = StatusCode(1101);
    pub const UNKNOWN_SERVICE: StatusCode = StatusCode(1102);
    pub const SERVICE_ACTIVE: StatusCode = StatusCode(1103);
    pub const BAD_COUNT: StatusCode = StatusCode(1104);
    pub const NO_MEMORY: StatusCode = StatusCode(1105);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl From<bsd_core::BootstrapError> for StatusCode {
    fn from(err: bsd_core::BootstrapError) -> Self {
        StatusCode(err.code())
    }
}

/// The three values `status`/`info` report for a service's reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Inactive,
    Active,
    OnDemand,
}

impl From<bsd_core::ServiceStatusValue> for ServiceStatus {
    fn from(value: bsd_core::ServiceStatusValue) -> Self {
        match value {
            bsd_core::ServiceStatusValue::Inactive => ServiceStatus::Inactive,
            bsd_core::ServiceStatusValue::Active => ServiceStatus::Active,
            bsd_core::ServiceStatusValue::OnDemand => ServiceStatus::OnDemand,
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
