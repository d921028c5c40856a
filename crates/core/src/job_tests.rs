// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::notify::Notification;
use crate::rights::RightsRegistry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn registry() -> RightsRegistry {
    let (tx, _rx) = mpsc::unbounded_channel::<Notification>();
    RightsRegistry::new(tx)
}

fn make_root() -> Job {
    let reg = registry();
    let id = JobId::new();
    let privileged = reg.allocate_recv(crate::rights::RegistryOwner::JobPort { job: id });
    let unprivileged = reg.allocate_recv(crate::rights::RegistryOwner::JobPort { job: id });
    Job::root(id, privileged, unprivileged)
}

#[test]
fn root_job_has_no_parent() {
    let job = make_root();
    assert!(job.is_root());
    assert!(job.parent.is_none());
}

#[test]
fn subset_job_tracks_parent_and_requestor() {
    let reg = registry();
    let parent_id = JobId::new();
    let id = JobId::new();
    let privileged = reg.allocate_recv(crate::rights::RegistryOwner::JobPort { job: id });
    let unprivileged = reg.allocate_recv(crate::rights::RegistryOwner::JobPort { job: id });
    let token = CancellationToken::new();
    let job = Job::subset(id, parent_id, privileged, unprivileged, token.clone());
    assert_eq!(job.parent, Some(parent_id));
    assert!(!job.is_root());
    assert!(!token.is_cancelled());
}

#[test]
fn lookup_service_reflects_insertions() {
    let mut job = make_root();
    assert!(job.lookup_service("svc").is_none());
    let reg = registry();
    let recv = reg.allocate_recv(crate::rights::RegistryOwner::Service { job: job.id, name: "svc".into() });
    let record = crate::service::ServiceRecord::declare("svc", recv, false, false);
    job.services.insert("svc".to_string(), record);
    assert!(job.lookup_service("svc").is_some());
    assert!(job.lookup_service_mut("svc").is_some());
}

#[test]
fn privileged_and_unprivileged_ports_differ() {
    let job = make_root();
    assert_ne!(job.privileged_port(), job.unprivileged_port());
}
