// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use bsd_core::{Daemon, DemandSet, RightsRegistry};
use bsd_wire::{Request, Response};
use fs2::FileExt;
use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::info;

use super::{Config, DaemonState, LifecycleError, StartupResult};
use crate::env;
use crate::protocol::{read_response, write_request};

/// Start the daemon.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock — those files
            // belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create the state directory.
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire the lock file first, to avoid races with a second instance.
    // Avoid truncating before we hold the lock, which would wipe a running
    // daemon's PID.
    let lock_file =
        std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Write the version file.
    std::fs::write(&config.version_path, env::PROTOCOL_VERSION)?;

    // 4. Remove a stale socket and bind — last, only after validation passes.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    // 5. Build the bootstrap namespace: registry, demand loop, root job.
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let registry = RightsRegistry::new(notify_tx.clone());
    let (demand_set, demand_handle, handoff_rx) = DemandSet::new(64);
    tokio::spawn(demand_set.run());

    // 6. Register with an inherited ancestor, if configured, before serving
    // any requests of our own. The client connection used for this call is
    // dropped immediately afterward, per spec.md's "clears its own
    // task-level bootstrap port" instruction — we never keep it around for
    // ongoing use. Lookups this daemon can't resolve locally are forwarded
    // to the same upstream socket at request time by the listener.
    let has_upstream = match env::upstream_socket() {
        Some(path) => {
            register_with_upstream(&path).await?;
            true
        }
        None => false,
    };

    let pid1_lenient = env::is_pid1();
    let daemon = Arc::new(Mutex::new(Daemon::new(registry, notify_tx, demand_handle, has_upstream, pid1_lenient)));

    info!("daemon started");

    Ok(StartupResult {
        daemon: DaemonState { config: config.clone(), lock_file, daemon, notify_rx, handoff_rx, start_time: Instant::now() },
        listener,
    })
}

/// Register this daemon under `"bsdd.<pid>"` with the upstream bootstrap
/// daemon.
///
/// This is a one-shot client role played over a fresh connection; the
/// connection is closed as soon as the reply arrives, so no lingering
/// upstream-facing handle survives into request serving.
async fn register_with_upstream(socket_path: &std::path::Path) -> Result<(), LifecycleError> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| LifecycleError::UpstreamRegistration(e.to_string()))?;

    let name = format!("bsdd.{}", std::process::id());
    let request = Request::Register { name, unregister: false };
    write_request(&mut stream, &request, env::ipc_timeout())
        .await
        .map_err(|e| LifecycleError::UpstreamRegistration(e.to_string()))?;
    let response = read_response(&mut stream, env::ipc_timeout())
        .await
        .map_err(|e| LifecycleError::UpstreamRegistration(e.to_string()))?;

    match response {
        Response::Port { .. } => {
            info!(upstream = %socket_path.display(), "registered with ancestor bootstrap context");
            Ok(())
        }
        Response::Error { status } => {
            Err(LifecycleError::UpstreamRegistration(format!("upstream rejected registration: {status:?}")))
        }
        other => Err(LifecycleError::UpstreamRegistration(format!("unexpected reply: {other:?}"))),
    }
}

/// Clean up resources on startup failure.
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.version_path.exists() {
        let _ = std::fs::remove_file(&config.version_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
