// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap contexts ("jobs") and the tree of subset/parent relationships
//! between them.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::rights::ReceiveRight;
use crate::service::ServiceRecord;

crate::define_id! {
    /// Identifies a bootstrap context (root, or a subset created on behalf
    /// of a requesting client).
    pub struct JobId("job-");
}

/// Depth bound on the subset tree. Chosen generously above any real-world
/// nesting (interactive session → per-app → per-plugin subsets) to catch a
/// runaway or cyclic `subset` caller rather than to model a hard kernel
/// limit.
pub const MAX_SUBSET_DEPTH: usize = 100;

/// The validated form of `create_server`'s command/uid/on-demand wire
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub command: Vec<String>,
    pub argv0: Option<String>,
    pub uid: u32,
    pub on_demand: bool,
}

/// A bootstrap context: a node in the subset tree, holding the named
/// services declared directly within it.
pub struct Job {
    pub id: JobId,
    pub parent: Option<JobId>,
    pub children: Vec<JobId>,
    pub services: HashMap<String, ServiceRecord>,
    /// The most recently declared server spec for this job, inherited by
    /// subsequent `create_service` calls that name it as their launcher.
    pub server: Option<ServerSpec>,
    /// Privileged bootstrap port — accepts `create_server`/`create_service`.
    privileged_recv: ReceiveRight,
    /// Unprivileged bootstrap port — accepts lookups only.
    unprivileged_recv: ReceiveRight,
    /// Liveness of the client that requested this subset. `None` for the
    /// root job, which has no requestor to outlive.
    pub requestor: Option<CancellationToken>,
}

impl Job {
    /// `id` is generated by the caller ahead of time since the job's ports
    /// must be registered under it before the `Job` itself exists.
    pub fn root(id: JobId, privileged_recv: ReceiveRight, unprivileged_recv: ReceiveRight) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            services: HashMap::new(),
            server: None,
            privileged_recv,
            unprivileged_recv,
            requestor: None,
        }
    }

    pub fn subset(
        id: JobId,
        parent: JobId,
        privileged_recv: ReceiveRight,
        unprivileged_recv: ReceiveRight,
        requestor: CancellationToken,
    ) -> Self {
        Self {
            id,
            parent: Some(parent),
            children: Vec::new(),
            services: HashMap::new(),
            server: None,
            privileged_recv,
            unprivileged_recv,
            requestor: Some(requestor),
        }
    }

    pub fn privileged_port(&self) -> crate::rights::PortName {
        self.privileged_recv.name()
    }

    pub fn unprivileged_port(&self) -> crate::rights::PortName {
        self.unprivileged_recv.name()
    }

    pub fn lookup_service(&self, name: &str) -> Option<&ServiceRecord> {
        self.services.get(name)
    }

    pub fn lookup_service_mut(&mut self, name: &str) -> Option<&mut ServiceRecord> {
        self.services.get_mut(name)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
