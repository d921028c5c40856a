// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use bsd_wire::{Request, Response};
use serial_test::serial;
use tempfile::TempDir;
use tokio::net::UnixListener;

use super::*;
use crate::protocol::{read_request, write_response};

fn config_in(dir: &TempDir) -> Config {
    let state_dir = dir.path().to_path_buf();
    Config {
        socket_path: state_dir.join("bsdd.sock"),
        lock_path: state_dir.join("bsdd.pid"),
        version_path: state_dir.join("bsdd.version"),
        log_path: state_dir.join("bsdd.log"),
        state_dir,
    }
}

#[tokio::test]
async fn startup_binds_the_socket_and_writes_pid_and_version_files() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let result = startup(&config).await.unwrap();
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
    assert!(config.version_path.exists());
    assert!(!result.daemon.daemon.lock().has_upstream());

    let mut state = result.daemon;
    state.shutdown().unwrap();
    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
    assert!(!config.version_path.exists());
}

#[tokio::test]
async fn second_startup_against_the_same_lock_file_fails() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let first = startup(&config).await.unwrap();
    let err = startup(&config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
    // The first daemon's files must survive a failed second attempt.
    assert!(config.lock_path.exists());
    assert!(config.socket_path.exists());

    drop(first);
}

#[tokio::test]
async fn failed_bind_leaves_no_stray_files_behind() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    // The socket's parent directory is never created, so binding fails.
    config.socket_path = dir.path().join("nested").join("missing").join("bsdd.sock");

    let err = startup(&config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::BindFailed(_, _)));
    assert!(!config.version_path.exists());
    assert!(!config.lock_path.exists());
}

#[tokio::test]
#[serial]
async fn startup_registers_with_a_configured_upstream() {
    let upstream_dir = TempDir::new().unwrap();
    let upstream_socket = upstream_dir.path().join("upstream.sock");
    let listener = UnixListener::bind(&upstream_socket).unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(request, Request::Register { unregister: false, .. }));
        write_response(&mut stream, &Response::Port { name: 42 }, Duration::from_secs(1))
            .await
            .unwrap();
    });

    std::env::set_var("BSD_UPSTREAM_SOCKET", &upstream_socket);
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let result = startup(&config).await.unwrap();
    std::env::remove_var("BSD_UPSTREAM_SOCKET");

    assert!(result.daemon.daemon.lock().has_upstream());
}

#[tokio::test]
#[serial]
async fn startup_fails_when_upstream_is_unreachable() {
    let missing = std::path::PathBuf::from("/tmp/bsd-no-such-upstream.sock");
    std::env::set_var("BSD_UPSTREAM_SOCKET", &missing);
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let err = startup(&config).await.unwrap_err();
    std::env::remove_var("BSD_UPSTREAM_SOCKET");

    assert!(matches!(err, LifecycleError::UpstreamRegistration(_)));
    assert!(!config.lock_path.exists());
}
