// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bsd_core::test_support::DaemonHarness;
use bsd_core::ServerSpec;

use super::*;

fn current_uid() -> u32 {
    nix::unistd::Uid::current().as_raw()
}

#[tokio::test]
async fn spawn_and_wait_runs_the_command_and_reports_its_exit_status() {
    let spec = ServerSpec {
        command: vec!["/bin/true".to_string()],
        argv0: None,
        uid: current_uid(),
        on_demand: true,
    };
    let status = spawn_and_wait(&spec).await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn spawn_and_wait_rejects_an_empty_command() {
    let spec = ServerSpec { command: vec![], argv0: None, uid: current_uid(), on_demand: true };
    let err = spawn_and_wait(&spec).await.unwrap_err();
    assert!(matches!(err, LaunchError::EmptyCommand));
}

#[tokio::test]
async fn trigger_launches_the_owning_jobs_server_exactly_once_while_running() {
    let harness = DaemonHarness::new();
    let root = harness.daemon.root_job();
    let caller = harness.privileged();
    let daemon = Arc::new(Mutex::new(harness.daemon));

    daemon
        .lock()
        .create_server(
            caller,
            ServerSpec { command: vec!["/bin/sleep".to_string(), "0.2".to_string()], argv0: None, uid: current_uid(), on_demand: true },
        )
        .unwrap();
    daemon.lock().create_service(caller, "com.example.on-demand", true).unwrap();

    let launcher = Launcher::new();
    let key = bsd_core::ServiceKey { job: root, service: "com.example.on-demand".to_string() };

    launcher.trigger(&daemon, &key);
    assert!(launcher.is_running(root));

    // A second firing while the first instance is still up must not spawn
    // a second process.
    launcher.trigger(&daemon, &key);
    assert!(launcher.is_running(root));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!launcher.is_running(root));
}

#[tokio::test]
async fn trigger_ignores_a_stale_handoff_for_a_checked_in_service() {
    let harness = DaemonHarness::new();
    let root = harness.daemon.root_job();
    let caller = harness.privileged();
    let daemon = Arc::new(Mutex::new(harness.daemon));

    daemon
        .lock()
        .create_server(
            caller,
            ServerSpec { command: vec!["/bin/true".to_string()], argv0: None, uid: current_uid(), on_demand: true },
        )
        .unwrap();
    daemon.lock().create_service(caller, "com.example.active", true).unwrap();
    daemon.lock().check_in(caller, "com.example.active").unwrap();

    let launcher = Launcher::new();
    let key = bsd_core::ServiceKey { job: root, service: "com.example.active".to_string() };
    launcher.trigger(&daemon, &key);

    assert!(!launcher.is_running(root));
}
