// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::DaemonHarness;
use crate::ServerSpec;

#[tokio::test]
async fn declare_check_in_and_look_up_round_trip() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();

    let declared_port = h.daemon.create_service(root, "com.example.echo", false).unwrap();
    let looked_up = h.daemon.look_up(h.unprivileged(), "com.example.echo").unwrap();
    assert_eq!(looked_up.name(), declared_port);

    let checked_in_port = h.daemon.check_in(root, "com.example.echo").unwrap();
    assert_eq!(checked_in_port, declared_port);
    assert_eq!(h.daemon.status(root, "com.example.echo").unwrap(), ServiceStatusValue::Active);
}

#[tokio::test]
async fn unprivileged_caller_cannot_declare_services() {
    let mut h = DaemonHarness::new();
    let caller = h.unprivileged();
    let err = h.daemon.create_service(caller, "x", false).unwrap_err();
    assert_eq!(err, BootstrapError::NotPrivileged);
}

#[tokio::test]
async fn duplicate_service_name_is_rejected() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "dup", false).unwrap();
    let err = h.daemon.create_service(root, "dup", false).unwrap_err();
    assert_eq!(err, BootstrapError::NameInUse);
}

#[tokio::test]
async fn second_check_in_reports_service_active() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "svc", false).unwrap();
    h.daemon.check_in(root, "svc").unwrap();
    let err = h.daemon.check_in(root, "svc").unwrap_err();
    assert_eq!(err, BootstrapError::ServiceActive);
}

#[tokio::test]
async fn look_up_unknown_service_fails() {
    let h = DaemonHarness::new();
    let err = h.daemon.look_up(h.unprivileged(), "nope").unwrap_err();
    assert_eq!(err, BootstrapError::UnknownService);
}

#[tokio::test]
async fn look_up_array_reports_per_name_results() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "present", false).unwrap();
    let results =
        h.daemon.look_up_array(h.unprivileged(), &["present".to_string(), "missing".to_string()]);
    assert_eq!(results.len(), 2);
    assert!(results[0].result.is_ok());
    assert_eq!(results[1].result.clone().unwrap_err(), BootstrapError::UnknownService);
}

#[tokio::test]
async fn on_demand_service_wakes_the_demand_loop() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "on-demand", true).unwrap();

    let send = h.daemon.look_up(h.unprivileged(), "on-demand").unwrap();
    send.send(crate::rights::Message(vec![0]));

    let fired = tokio::time::timeout(std::time::Duration::from_secs(1), h.handoff_rx.recv())
        .await
        .expect("demand loop should fire")
        .expect("handoff channel open");
    assert_eq!(fired.key.service, "on-demand");
    fired.ack();
}

#[tokio::test]
async fn subset_creates_isolated_child_job_and_respects_parent_lookup() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "shared", false).unwrap();

    let token = CancellationToken::new();
    let child = h.daemon.subset(root, token).unwrap();
    let child_caller = Caller { job: child, privileged: true, uid: 0 };

    assert!(h.daemon.look_up(child_caller, "shared").is_ok());
    assert_eq!(h.daemon.parent(child_caller).unwrap(), h.daemon.root_job());
}

#[tokio::test]
async fn parent_of_root_is_root() {
    let h = DaemonHarness::new();
    let root_caller = h.privileged();
    assert_eq!(h.daemon.parent(root_caller).unwrap(), h.daemon.root_job());
}

#[tokio::test]
async fn teardown_subset_removes_job_and_releases_ports() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    let token = CancellationToken::new();
    let child = h.daemon.subset(root, token).unwrap();

    h.daemon.teardown_subset(child);
    let err = h.daemon.info(Caller { job: child, privileged: true, uid: 0 }).unwrap_err();
    assert_eq!(err, BootstrapError::UnknownService);
}

#[tokio::test]
async fn register_then_unregister_dynamic_service() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    let port = h.daemon.register(root, "dyn.svc", false).unwrap();
    assert!(port.is_some());
    assert_eq!(h.daemon.status(root, "dyn.svc").unwrap(), ServiceStatusValue::Active);

    h.daemon.register(root, "dyn.svc", true).unwrap();
    let err = h.daemon.status(root, "dyn.svc").unwrap_err();
    assert_eq!(err, BootstrapError::UnknownService);
}

#[tokio::test]
async fn deleted_service_stays_tombstoned_against_ancestor_fallback() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "shadowed", false).unwrap();

    let token = CancellationToken::new();
    let child = h.daemon.subset(root, token).unwrap();
    let child_caller = Caller { job: child, privileged: true, uid: 0 };
    let _ = h.daemon.register(child_caller, "shadowed", false).unwrap();
    h.daemon.register(child_caller, "shadowed", true).unwrap();

    let err = h.daemon.look_up(child_caller, "shadowed").unwrap_err();
    assert_eq!(err, BootstrapError::UnknownService);
}

#[tokio::test]
async fn unregistering_a_name_declared_only_in_an_ancestor_installs_a_tombstone() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.register(root, "y", false).unwrap();

    let token = CancellationToken::new();
    let child = h.daemon.subset(root, token).unwrap();
    let child_caller = Caller { job: child, privileged: true, uid: 0 };

    // "y" was never declared in the child's own job — only in root.
    h.daemon.register(child_caller, "y", true).unwrap();

    assert_eq!(h.daemon.look_up(child_caller, "y").unwrap_err(), BootstrapError::UnknownService);
    assert!(h.daemon.look_up(root, "y").is_ok());
}

#[tokio::test]
async fn create_server_with_mismatched_uid_is_not_privileged() {
    let mut h = DaemonHarness::new();
    let caller = Caller { job: h.daemon.root_job(), privileged: true, uid: 501 };
    let spec = ServerSpec { command: vec!["/bin/true".into()], argv0: None, uid: 0, on_demand: true };
    let err = h.daemon.create_server(caller, spec).unwrap_err();
    assert_eq!(err, BootstrapError::NotPrivileged);
}

#[tokio::test]
async fn create_server_with_matching_uid_succeeds_for_a_non_root_caller() {
    let mut h = DaemonHarness::new();
    let caller = Caller { job: h.daemon.root_job(), privileged: true, uid: 501 };
    let spec = ServerSpec { command: vec!["/bin/true".into()], argv0: None, uid: 501, on_demand: true };
    h.daemon.create_server(caller, spec).unwrap();
}

#[tokio::test]
async fn pid1_lenient_downgrades_a_mismatched_server_uid_instead_of_rejecting() {
    let mut h = DaemonHarness::with_pid1_lenient(true);
    let caller = Caller { job: h.daemon.root_job(), privileged: true, uid: 501 };
    let spec = ServerSpec { command: vec!["/bin/true".into()], argv0: None, uid: 0, on_demand: true };
    h.daemon.create_server(caller, spec).unwrap();
}

#[tokio::test]
async fn parent_requires_a_root_caller() {
    let h = DaemonHarness::new();
    let caller = Caller { job: h.daemon.root_job(), privileged: true, uid: 501 };
    assert_eq!(h.daemon.parent(caller).unwrap_err(), BootstrapError::NotPrivileged);
}

#[tokio::test]
async fn info_reports_service_name_program_and_status() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon
        .create_server(root, ServerSpec { command: vec!["/usr/libexec/echod".into()], argv0: None, uid: 0, on_demand: true })
        .unwrap();
    h.daemon.create_service(root, "svc", true).unwrap();

    let info = h.daemon.info(root).unwrap();
    assert_eq!(info.names, vec!["svc".to_string()]);
    assert_eq!(info.programs, vec!["/usr/libexec/echod".to_string()]);
    assert_eq!(info.statuses, vec![ServiceStatusValue::OnDemand]);
}

#[tokio::test]
async fn info_walks_ancestors_and_aggregates_their_services() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "root-svc", false).unwrap();

    let token = CancellationToken::new();
    let child = h.daemon.subset(root, token).unwrap();
    let child_caller = Caller { job: child, privileged: true, uid: 0 };
    h.daemon.create_service(child_caller, "child-svc", false).unwrap();

    let info = h.daemon.info(child_caller).unwrap();
    assert_eq!(info.names.len(), 2);
    assert!(info.names.contains(&"root-svc".to_string()));
    assert!(info.names.contains(&"child-svc".to_string()));
}

#[tokio::test]
async fn reclaim_checked_in_returns_service_to_demand_set() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    h.daemon.create_service(root, "relaunch", true).unwrap();
    h.daemon.check_in(root, "relaunch").unwrap();

    h.daemon.reclaim_checked_in(h.daemon.root_job(), "relaunch");
    assert_eq!(h.daemon.status(root, "relaunch").unwrap(), ServiceStatusValue::OnDemand);

    let send = h.daemon.look_up(h.unprivileged(), "relaunch").unwrap();
    send.send(crate::rights::Message(vec![0]));
    let fired = tokio::time::timeout(std::time::Duration::from_secs(1), h.handoff_rx.recv())
        .await
        .expect("demand loop should fire after reclaim")
        .expect("handoff channel open");
    fired.ack();
}

#[tokio::test]
async fn has_upstream_reflects_constructor_flag() {
    let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
    let registry = RightsRegistry::new(notify_tx.clone());
    let (demand_set, demand_handle, _handoff_rx) = crate::demand::DemandSet::new(8);
    tokio::spawn(demand_set.run());
    let daemon = Daemon::new(registry, notify_tx, demand_handle, true, false);
    assert!(daemon.has_upstream());
    assert!(!daemon.pid1_lenient());
}

#[tokio::test]
async fn cancelling_a_subsets_requestor_posts_dead_name() {
    let mut h = DaemonHarness::new();
    let root = h.privileged();
    let token = CancellationToken::new();
    let _child = h.daemon.subset(root, token.clone()).unwrap();

    token.cancel();
    let notification = tokio::time::timeout(std::time::Duration::from_secs(1), h.notify_rx.recv())
        .await
        .expect("dead-name should be posted")
        .expect("notify channel open");
    assert!(matches!(notification, Notification::DeadName { .. }));
}
