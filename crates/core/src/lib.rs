// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bsd-core: bootstrap namespace and rights-management core for the `bsd`
//! daemon family.

pub mod macros;

pub mod clock;
pub mod daemon;
pub mod demand;
pub mod id;
pub mod job;
pub mod notify;
pub mod rights;
pub mod service;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use daemon::{BootstrapError, Caller, Daemon, JobInfo, LookupArrayEntry};
pub use demand::{DemandHandle, DemandSet, Handoff, ServiceKey};
pub use job::{Job, JobId, ServerSpec};
pub use notify::Notification;
pub use rights::{Mailbox, PortName, ReceiveRight, RegistryError, RightsRegistry, SendRight};
pub use service::{ServiceError, ServiceRecord, ServiceState, ServiceStatusValue};
