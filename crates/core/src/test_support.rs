// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-only harness for wiring up a [`Daemon`] with its demand loop and
//! notification channel, for use by this crate's own tests and by
//! `bsd-daemon`'s integration tests (via the `test-support` feature).

use tokio::sync::mpsc;

use crate::daemon::{Caller, Daemon};
use crate::demand::{DemandSet, Handoff};
use crate::notify::Notification;
use crate::rights::RightsRegistry;

pub struct DaemonHarness {
    pub daemon: Daemon,
    pub notify_rx: mpsc::UnboundedReceiver<Notification>,
    pub handoff_rx: mpsc::Receiver<Handoff>,
}

impl DaemonHarness {
    pub fn new() -> Self {
        Self::with_pid1_lenient(false)
    }

    /// A harness whose `Daemon` believes it is running as PID 1, for testing
    /// the "PID 1 lenient" `create_server` downgrade rule.
    pub fn with_pid1_lenient(pid1_lenient: bool) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let registry = RightsRegistry::new(notify_tx.clone());
        let (demand_set, demand_handle, handoff_rx) = DemandSet::new(8);
        tokio::spawn(demand_set.run());
        let daemon = Daemon::new(registry, notify_tx, demand_handle, false, pid1_lenient);
        Self { daemon, notify_rx, handoff_rx }
    }

    /// A root-job caller with UID 0 — privileged port, full privilege.
    pub fn privileged(&self) -> Caller {
        Caller { job: self.daemon.root_job(), privileged: true, uid: 0 }
    }

    /// A root-job caller over the unprivileged port, with a non-root UID.
    pub fn unprivileged(&self) -> Caller {
        Caller { job: self.daemon.root_job(), privileged: false, uid: 501 }
    }
}

impl Default for DaemonHarness {
    fn default() -> Self {
        Self::new()
    }
}
