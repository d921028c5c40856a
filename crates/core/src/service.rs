// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service records: the per-name ownership and state machine tracked inside
//! a [`crate::job::Job`].

use crate::rights::{PortName, ReceiveRight};

/// `Declared` → `Active` (checked in) → `Reclaimed` (owner exited, eligible
/// for on-demand relaunch) → back to `Declared`, or `Deleted` (tombstoned,
/// terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Declared,
    Active,
    Reclaimed,
    Deleted,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service already checked in")]
    AlreadyActive,
    #[error("service has been deleted")]
    Deleted,
}

/// A named service owned by a job: its receive right (while the daemon
/// still holds it) plus the state machine that tracks who currently owns
/// that right.
pub struct ServiceRecord {
    name: String,
    state: ServiceState,
    receive: Option<ReceiveRight>,
    /// `true` for services registered dynamically via `register`, `false`
    /// for services declared ahead of time via `create_service`.
    dynamic: bool,
    on_demand: bool,
}

impl ServiceRecord {
    pub fn declare(name: impl Into<String>, receive: ReceiveRight, dynamic: bool, on_demand: bool) -> Self {
        Self { name: name.into(), state: ServiceState::Declared, receive: Some(receive), dynamic, on_demand }
    }

    /// A dynamically-registered record with no receive right, installed to
    /// shadow an ancestor's record of the same name within this Job. Same
    /// terminal shape as [`Self::delete`], constructed directly since there
    /// is no live record here to transition.
    pub fn tombstone(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: ServiceState::Deleted, receive: None, dynamic: true, on_demand: false }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_on_demand(&self) -> bool {
        self.on_demand
    }

    pub fn port_name(&self) -> Option<PortName> {
        self.receive.as_ref().map(|r| r.name())
    }

    /// The underlying right, available for the demand loop to watch while
    /// the service is not checked out to an owner.
    pub fn receive(&self) -> Option<&ReceiveRight> {
        self.receive.as_ref()
    }

    /// Transition to `Active`, handing the receive right's name back to the
    /// caller. Fails if already checked in or deleted.
    pub fn check_in(&mut self) -> Result<PortName, ServiceError> {
        match self.state {
            ServiceState::Declared | ServiceState::Reclaimed => {
                let name = self.receive.as_ref().map(|r| r.name());
                self.state = ServiceState::Active;
                name.ok_or(ServiceError::Deleted)
            }
            ServiceState::Active => Err(ServiceError::AlreadyActive),
            ServiceState::Deleted => Err(ServiceError::Deleted),
        }
    }

    /// The checked-in owner has gone away; take the right back so the
    /// demand loop can watch it again for the next on-demand launch.
    pub fn reclaim(&mut self) {
        if self.state == ServiceState::Active {
            self.state = ServiceState::Reclaimed;
        }
    }

    /// Tombstone the service permanently (used for dynamically registered
    /// services removed via an empty `register`, and for services whose
    /// owning job is torn down).
    pub fn delete(&mut self) {
        self.state = ServiceState::Deleted;
        self.receive = None;
    }

    /// Whether this service's mailbox should currently be in the demand
    /// set: not checked out, not deleted, and configured for on-demand
    /// launch.
    pub fn watchable(&self) -> bool {
        self.on_demand && matches!(self.state, ServiceState::Declared | ServiceState::Reclaimed)
    }

    /// The wire-facing status value for this service, or `None` if it has
    /// been tombstoned (callers should treat that as `UnknownService`).
    pub fn status_value(&self) -> Option<ServiceStatusValue> {
        match self.state {
            ServiceState::Active => Some(ServiceStatusValue::Active),
            ServiceState::Declared | ServiceState::Reclaimed if self.on_demand => {
                Some(ServiceStatusValue::OnDemand)
            }
            ServiceState::Declared | ServiceState::Reclaimed => Some(ServiceStatusValue::Inactive),
            ServiceState::Deleted => None,
        }
    }
}

/// The three values `status`/`info` report over the wire: `Inactive` (0),
/// `Active` (1, checked in), `OnDemand` (2, declared but waiting on mailbox
/// activity to trigger a relaunch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatusValue {
    Inactive = 0,
    Active = 1,
    OnDemand = 2,
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
