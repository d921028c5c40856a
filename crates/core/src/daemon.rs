// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bootstrap RPC surface: one method per operation, each taking a
//! resolved [`Caller`] and returning `Result<T, BootstrapError>` with the
//! exact wire status codes.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::demand::{DemandHandle, ServiceKey};
use crate::job::{Job, JobId, ServerSpec, MAX_SUBSET_DEPTH};
use crate::notify::Notification;
use crate::rights::{PortName, RegistryError, RegistryOwner, RightsRegistry, SendRight};
use crate::service::{ServiceError, ServiceRecord, ServiceStatusValue};

/// The resolved identity an inbound request is attributed to: which job's
/// namespace it's calling into, whether it came in over that job's
/// privileged or unprivileged port, and the connecting peer's effective UID
/// (resolved from the transport's peer credentials, e.g. `SO_PEERCRED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub job: JobId,
    pub privileged: bool,
    pub uid: u32,
}

/// RPC-level errors, matching the wire status codes exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("not privileged for this operation")]
    NotPrivileged,
    #[error("service name already in use")]
    NameInUse,
    #[error("unknown service")]
    UnknownService,
    #[error("service already active")]
    ServiceActive,
    #[error("bad count")]
    BadCount,
    #[error("no memory")]
    NoMemory,
}

impl BootstrapError {
    pub fn code(self) -> i32 {
        match self {
            BootstrapError::NotPrivileged => 1100,
            BootstrapError::NameInUse => 1101,
            BootstrapError::UnknownService => 1102,
            BootstrapError::ServiceActive => 1103,
            BootstrapError::BadCount => 1104,
            BootstrapError::NoMemory => 1105,
        }
    }
}

impl From<RegistryError> for BootstrapError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::TableExhausted => BootstrapError::NoMemory,
            RegistryError::UnknownPort(_) | RegistryError::AlreadyRegistered(_) => {
                BootstrapError::UnknownService
            }
        }
    }
}

impl From<ServiceError> for BootstrapError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::AlreadyActive => BootstrapError::ServiceActive,
            ServiceError::Deleted => BootstrapError::UnknownService,
        }
    }
}

/// Snapshot returned by the `info` RPC: the service names, their owning
/// programs, and their activity statuses, aggregated by walking from the
/// caller's Job up through every ancestor (spec.md §4.4). All three arrays
/// are parallel and the same length.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub names: Vec<String>,
    pub programs: Vec<String>,
    pub statuses: Vec<ServiceStatusValue>,
}

/// One entry of a `look_up_array` response. The array is allocated fresh on
/// every call rather than reused from a static buffer.
#[derive(Debug, Clone)]
pub struct LookupArrayEntry {
    pub name: String,
    pub result: Result<PortName, BootstrapError>,
}

/// The aggregate bootstrap namespace: the job tree, the rights registry, and
/// the channels the RPC surface and the demand loop share. Constructed once
/// at startup and threaded into every handler call — no hidden singletons.
pub struct Daemon {
    root: JobId,
    jobs: HashMap<JobId, Job>,
    registry: RightsRegistry,
    notify_tx: mpsc::UnboundedSender<Notification>,
    demand: DemandHandle,
    /// Whether this daemon was itself registered as a subset of an inherited
    /// ancestor bootstrap context over the transport (see
    /// `bsd-daemon::lifecycle::startup`). When true, a lookup unresolved in
    /// this namespace is forwarded to that ancestor verbatim rather than
    /// failing with `UnknownService`.
    has_upstream: bool,
    /// Whether this daemon process is itself PID 1. Relaxes `create_server`'s
    /// UID check: a non-root caller asking for a server under a different UID
    /// is silently downgraded to its own UID rather than rejected (spec.md
    /// §4.4/§8's "PID 1 lenient" rule).
    pid1_lenient: bool,
}

impl Daemon {
    pub fn new(
        registry: RightsRegistry,
        notify_tx: mpsc::UnboundedSender<Notification>,
        demand: DemandHandle,
        has_upstream: bool,
        pid1_lenient: bool,
    ) -> Self {
        let root_id = JobId::new();
        let privileged = registry.allocate_recv(RegistryOwner::JobPort { job: root_id });
        let unprivileged = registry.allocate_recv(RegistryOwner::JobPort { job: root_id });
        let root = Job::root(root_id, privileged, unprivileged);
        let mut jobs = HashMap::new();
        jobs.insert(root_id, root);
        Self { root: root_id, jobs, registry, notify_tx, demand, has_upstream, pid1_lenient }
    }

    pub fn root_job(&self) -> JobId {
        self.root
    }

    /// Whether an unresolved lookup should be forwarded to an inherited
    /// ancestor rather than failing outright. The forward itself is an
    /// async socket call the transport layer performs; this method only
    /// tells the caller whether one is expected to succeed.
    pub fn has_upstream(&self) -> bool {
        self.has_upstream
    }

    pub fn pid1_lenient(&self) -> bool {
        self.pid1_lenient
    }

    /// Resolve the job that owns a privileged or unprivileged bootstrap
    /// port. Used by the notification dispatcher to turn a `DeadName`'s
    /// `PortName` back into the job to tear down.
    pub fn job_owning_port(&self, name: PortName) -> Option<JobId> {
        match self.registry.lookup_owner(name)? {
            RegistryOwner::JobPort { job } => Some(job),
            RegistryOwner::Service { .. } | RegistryOwner::Notify => None,
        }
    }

    /// Resolve the job and service name that own a checked-out service
    /// receive right. Used by the notification dispatcher to turn a
    /// `PortDestroyed`'s `PortName` back into the `reclaim_checked_in` call
    /// it drives.
    pub fn service_owning_port(&self, name: PortName) -> Option<(JobId, String)> {
        match self.registry.lookup_owner(name)? {
            RegistryOwner::Service { job, name } => Some((job, name)),
            RegistryOwner::JobPort { .. } | RegistryOwner::Notify => None,
        }
    }

    fn job(&self, id: JobId) -> Result<&Job, BootstrapError> {
        self.jobs.get(&id).ok_or(BootstrapError::UnknownService)
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut Job, BootstrapError> {
        self.jobs.get_mut(&id).ok_or(BootstrapError::UnknownService)
    }

    fn watch_key(job: JobId, name: &str) -> ServiceKey {
        ServiceKey { job, service: name.to_string() }
    }

    fn arm_watch(&self, job: JobId, record: &ServiceRecord) {
        if record.watchable() {
            if let Some(receive) = record.receive() {
                self.demand.watch(Self::watch_key(job, record.name()), receive.notify_handle());
            }
        }
    }

    // -- privileged: declare server/service config ----------------------

    /// §4.4: caller must be UID 0, or `caller.uid == spec.uid`. When this
    /// daemon is PID 1, a non-root caller asking for a different UID is not
    /// rejected — the requested UID is silently downgraded to the caller's
    /// own, rather than failing with `NotPrivileged`.
    pub fn create_server(&mut self, caller: Caller, mut spec: ServerSpec) -> Result<(), BootstrapError> {
        if caller.uid != 0 && spec.uid != caller.uid {
            if self.pid1_lenient {
                spec.uid = caller.uid;
            } else {
                return Err(BootstrapError::NotPrivileged);
            }
        }
        let job = self.job_mut(caller.job)?;
        info!(job = %caller.job, on_demand = spec.on_demand, uid = spec.uid, "create_server");
        job.server = Some(spec);
        Ok(())
    }

    pub fn create_service(
        &mut self,
        caller: Caller,
        name: &str,
        on_demand: bool,
    ) -> Result<PortName, BootstrapError> {
        if !caller.privileged {
            return Err(BootstrapError::NotPrivileged);
        }
        {
            let job = self.job(caller.job)?;
            if job.services.contains_key(name) {
                return Err(BootstrapError::NameInUse);
            }
        }
        let receive = self.registry.allocate_recv(RegistryOwner::Service {
            job: caller.job,
            name: name.to_string(),
        });
        let port = receive.name();
        let record = ServiceRecord::declare(name, receive, false, on_demand);
        self.arm_watch(caller.job, &record);
        let job = self.job_mut(caller.job)?;
        job.services.insert(name.to_string(), record);
        info!(job = %caller.job, name, on_demand, "create_service");
        Ok(port)
    }

    // -- check-in / register ----------------------------------------------

    pub fn check_in(&mut self, caller: Caller, name: &str) -> Result<PortName, BootstrapError> {
        let job = self.job_mut(caller.job)?;
        let record = job.services.get_mut(name).ok_or(BootstrapError::UnknownService)?;
        let port = record.check_in()?;
        self.demand.ignore(Self::watch_key(caller.job, name));
        info!(job = %caller.job, name, "check_in");
        Ok(port)
    }

    /// Called by the main loop when the demand loop hands off a fired
    /// `ServiceKey`. Returns the owning job's server spec if the service is
    /// still in a launchable state (on-demand, not currently checked in) —
    /// `None` means the handoff is stale (service reclaimed/checked-in/
    /// deleted since it fired) and the launch subsystem should do nothing.
    pub fn server_to_launch(&self, job: JobId, name: &str) -> Option<ServerSpec> {
        let job_ref = self.jobs.get(&job)?;
        let record = job_ref.services.get(name)?;
        if !record.is_on_demand() || !matches!(record.state(), crate::service::ServiceState::Declared | crate::service::ServiceState::Reclaimed) {
            return None;
        }
        job_ref.server.clone()
    }

    /// Called by the transport layer when a checked-in owner's connection
    /// goes away, so the service becomes eligible for on-demand relaunch
    /// again.
    pub fn reclaim_checked_in(&mut self, job: JobId, name: &str) {
        if let Some(j) = self.jobs.get_mut(&job) {
            if let Some(record) = j.services.get_mut(name) {
                record.reclaim();
                info!(job = %job, name, "reclaimed");
                self.arm_watch(job, record);
            }
        }
    }

    pub fn register(
        &mut self,
        caller: Caller,
        name: &str,
        unregister: bool,
    ) -> Result<Option<PortName>, BootstrapError> {
        if !caller.privileged {
            return Err(BootstrapError::NotPrivileged);
        }
        if unregister {
            let job = self.job_mut(caller.job)?;
            match job.services.get_mut(name) {
                Some(record) => record.delete(),
                // Not locally declared: install a tombstone so this job's
                // namespace stops resolving the name even though an ancestor
                // still declares it (spec.md §3/§8 tombstone shadowing).
                None => {
                    job.services.insert(name.to_string(), ServiceRecord::tombstone(name));
                }
            }
            self.demand.ignore(Self::watch_key(caller.job, name));
            info!(job = %caller.job, name, "register(unregister)");
            return Ok(None);
        }
        {
            let job = self.job(caller.job)?;
            if job.services.contains_key(name) {
                return Err(BootstrapError::NameInUse);
            }
        }
        let receive =
            self.registry.allocate_recv(RegistryOwner::Service { job: caller.job, name: name.to_string() });
        let port = receive.name();
        let mut record = ServiceRecord::declare(name, receive, true, false);
        // Dynamic registration hands over an already-live right: the
        // registering caller is using it right now.
        let _ = record.check_in();
        let job = self.job_mut(caller.job)?;
        job.services.insert(name.to_string(), record);
        info!(job = %caller.job, name, "register");
        Ok(Some(port))
    }

    // -- lookup -------------------------------------------------------------

    fn find_service(&self, start: JobId, name: &str) -> Option<(JobId, PortName)> {
        let mut current = Some(start);
        while let Some(id) = current {
            let job = self.jobs.get(&id)?;
            if let Some(record) = job.services.get(name) {
                if let Some(port) = record.port_name() {
                    return Some((id, port));
                }
                return None;
            }
            current = job.parent;
        }
        None
    }

    pub fn look_up(&self, caller: Caller, name: &str) -> Result<SendRight, BootstrapError> {
        let (_, port) = self.find_service(caller.job, name).ok_or(BootstrapError::UnknownService)?;
        debug!(job = %caller.job, name, "look_up");
        Ok(self.registry.insert_send(port)?)
    }

    pub fn look_up_array(&self, caller: Caller, names: &[String]) -> Vec<LookupArrayEntry> {
        names
            .iter()
            .map(|name| {
                let result = self
                    .find_service(caller.job, name)
                    .ok_or(BootstrapError::UnknownService)
                    .and_then(|(_, port)| Ok(port));
                LookupArrayEntry { name: name.clone(), result }
            })
            .collect()
    }

    pub fn status(&self, caller: Caller, name: &str) -> Result<ServiceStatusValue, BootstrapError> {
        let job = self.job(caller.job)?;
        let record = job.services.get(name).ok_or(BootstrapError::UnknownService)?;
        record.status_value().ok_or(BootstrapError::UnknownService)
    }

    // -- job tree -------------------------------------------------------------

    pub fn subset(&mut self, caller: Caller, requestor: CancellationToken) -> Result<JobId, BootstrapError> {
        if !caller.privileged {
            return Err(BootstrapError::NotPrivileged);
        }
        let mut depth = 0;
        let mut cursor = Some(caller.job);
        while let Some(id) = cursor {
            depth += 1;
            if depth > MAX_SUBSET_DEPTH {
                return Err(BootstrapError::NoMemory);
            }
            cursor = self.jobs.get(&id).and_then(|j| j.parent);
        }

        let id = JobId::new();
        let privileged = self.registry.allocate_recv(RegistryOwner::JobPort { job: id });
        let unprivileged = self.registry.allocate_recv(RegistryOwner::JobPort { job: id });
        let watch_port = privileged.name();
        let job = Job::subset(id, caller.job, privileged, unprivileged, requestor.clone());
        self.jobs.insert(id, job);
        if let Some(parent) = self.jobs.get_mut(&caller.job) {
            parent.children.push(id);
        }

        // The requestor's liveness is modeled as a `CancellationToken` bound
        // to its connection rather than a literal dead-name right (see
        // DESIGN.md). When it cancels, post a `DeadName` keyed by this
        // subset's own privileged port so the main loop's notification
        // dispatcher can resolve the owning job and tear it down.
        let notify_tx = self.notify_tx.clone();
        tokio::spawn(async move {
            requestor.cancelled().await;
            let _ = notify_tx.send(Notification::DeadName { name: watch_port });
        });

        info!(parent = %caller.job, child = %id, "subset");
        Ok(id)
    }

    /// §4.4: caller must be UID 0.
    ///
    /// Resolves the open question in the design notes: `parent` on the root
    /// job returns the root job itself rather than an error.
    pub fn parent(&self, caller: Caller) -> Result<JobId, BootstrapError> {
        if caller.uid != 0 {
            return Err(BootstrapError::NotPrivileged);
        }
        let job = self.job(caller.job)?;
        Ok(job.parent.unwrap_or(self.root))
    }

    pub fn unprivileged(&self, caller: Caller) -> Result<SendRight, BootstrapError> {
        let job = self.job(caller.job)?;
        Ok(self.registry.insert_send(job.unprivileged_port())?)
    }

    /// §4.4: walks from the caller's Job up through every ancestor, counting
    /// live Service Records (tombstones excluded), then fills three parallel
    /// arrays in a second pass. Two passes are mandatory — the array size
    /// isn't known until the first pass completes, and since handlers run
    /// synchronously nothing can mutate the tree between passes.
    pub fn info(&self, caller: Caller) -> Result<JobInfo, BootstrapError> {
        self.job(caller.job)?;

        let mut count = 0;
        let mut cursor = Some(caller.job);
        while let Some(id) = cursor {
            let job = self.jobs.get(&id).ok_or(BootstrapError::UnknownService)?;
            count += job.services.values().filter(|record| record.status_value().is_some()).count();
            cursor = job.parent;
        }

        let mut names = Vec::with_capacity(count);
        let mut programs = Vec::with_capacity(count);
        let mut statuses = Vec::with_capacity(count);
        let mut cursor = Some(caller.job);
        while let Some(id) = cursor {
            let job = self.jobs.get(&id).ok_or(BootstrapError::UnknownService)?;
            let program = Self::program_name(job);
            for record in job.services.values() {
                if let Some(status) = record.status_value() {
                    names.push(record.name().to_string());
                    programs.push(program.clone());
                    statuses.push(status);
                }
            }
            cursor = job.parent;
        }

        Ok(JobInfo { names, programs, statuses })
    }

    /// The program name `info` reports for a Job's services: its declared
    /// server's `argv0`, falling back to the first word of its command line,
    /// or empty if the Job has no server spec.
    fn program_name(job: &Job) -> String {
        job.server
            .as_ref()
            .map(|spec| spec.argv0.clone().unwrap_or_else(|| spec.command.first().cloned().unwrap_or_default()))
            .unwrap_or_default()
    }

    /// Tear down a subset whose requestor connection has gone away: removes
    /// it (and, recursively, its descendants) from the job tree and releases
    /// their ports from the registry.
    pub fn teardown_subset(&mut self, id: JobId) {
        let Some(job) = self.jobs.remove(&id) else { return };
        if job.is_root() {
            warn!("refusing to tear down the root job");
            self.jobs.insert(id, job);
            return;
        }
        if let Some(parent_id) = job.parent {
            if let Some(parent) = self.jobs.get_mut(&parent_id) {
                parent.children.retain(|c| *c != id);
            }
        }
        let children = job.children.clone();
        self.registry.release(job.privileged_port());
        self.registry.release(job.unprivileged_port());
        for name in job.services.keys() {
            self.demand.ignore(Self::watch_key(id, name));
        }
        info!(job = %id, "subset torn down");
        for child in children {
            self.teardown_subset(child);
        }
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
