// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bsdd`: the bootstrap namespace daemon.
//!
//! Architecture:
//! - Listener task: accepts connections, each handled on its own spawned
//!   task against a shared `Arc<Mutex<Daemon>>`.
//! - Demand-loop dispatcher: consumes fired services and asks the launch
//!   subsystem to relaunch their owning job's on-demand server.
//! - Notification dispatcher: consumes rights-lifetime notifications and
//!   drives the corresponding state transitions.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use bsd_core::{Daemon, Notification};
use bsd_daemon::launch::Launcher;
use bsd_daemon::{env, lifecycle, ListenCtx, Listener, StartupResult};
use parking_lot::Mutex;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("bsdd {}", env::PROTOCOL_VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("bsdd {}", env::PROTOCOL_VERSION);
                println!("Bootstrap namespace daemon — listens on a Unix socket for bsdctl.");
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: bsdd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = lifecycle::Config::load()?;
    let log_guard = setup_logging(&config)?;
    info!("starting bsdd");

    let StartupResult { daemon: mut state, listener: unix_listener } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(lifecycle::LifecycleError::LockFailed(_)) => {
            eprintln!("bsdd is already running");
            if let Ok(pid) = std::fs::read_to_string(&config.lock_path) {
                eprintln!("  pid: {}", pid.trim());
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to start daemon");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let daemon = Arc::clone(&state.daemon);
    let root = daemon.lock().root_job();
    let upstream_socket = env::upstream_socket();
    let ctx = Arc::new(ListenCtx::new(Arc::clone(&daemon), config.state_dir.clone(), upstream_socket));
    let caller = bsd_core::Caller { job: root, privileged: true, uid: 0 };
    tokio::spawn(Listener::new(unix_listener, ctx, caller).run());

    let launcher = Arc::new(Launcher::new());
    tokio::spawn(run_launch_dispatcher(Arc::clone(&daemon), Arc::clone(&launcher), state.handoff_rx));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "bsdd ready");
    println!("READY");

    loop {
        tokio::select! {
            notification = state.notify_rx.recv() => {
                match notification {
                    Some(n) => dispatch_notification(&daemon, n),
                    None => {
                        warn!("notification channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    tokio::time::sleep(env::drain_timeout().min(std::time::Duration::from_millis(250))).await;
    state.shutdown()?;
    info!("bsdd stopped");
    Ok(())
}

/// Drains demand-loop handoffs and asks the launch subsystem to act on each,
/// acknowledging so the demand loop re-arms that service's watch.
async fn run_launch_dispatcher(
    daemon: Arc<Mutex<Daemon>>,
    launcher: Arc<Launcher>,
    mut handoff_rx: tokio::sync::mpsc::Receiver<bsd_core::Handoff>,
) {
    while let Some(handoff) = handoff_rx.recv().await {
        debug!(job = %handoff.key.job, service = %handoff.key.service, "service demanded");
        launcher.trigger(&daemon, &handoff.key);
        handoff.ack();
    }
}

/// spec.md §4.5's notification table, translated to calls against the
/// shared [`Daemon`].
fn dispatch_notification(daemon: &Arc<Mutex<Daemon>>, notification: Notification) {
    match notification {
        Notification::PortDestroyed { name } => {
            let mut guard = daemon.lock();
            if let Some((job, service)) = guard.service_owning_port(name) {
                guard.reclaim_checked_in(job, &service);
            }
        }
        Notification::DeadName { name } => {
            // Our only persistent dead-name watch is a subset's requestor
            // liveness (see `Daemon::subset`); the upstream-clear case from
            // spec.md never arises here because the ancestor registration
            // connection is dropped immediately at startup (see
            // `lifecycle::startup::register_with_upstream`) rather than kept
            // open as a right we could observe dying later.
            let mut guard = daemon.lock();
            if let Some(job) = guard.job_owning_port(name) {
                guard.teardown_subset(job);
            }
        }
        Notification::NoSenders { name } => {
            // Refcount bookkeeping only — job-exit-when-idle policy is out
            // of scope (concurrent-instance/exit policy, spec.md's Non-goals).
            debug!(port = ?name, "no senders remain");
        }
        Notification::PortDeleted { name } | Notification::SendOnce { name } => {
            debug!(port = ?name, "ignored notification");
        }
    }
}

fn setup_logging(
    config: &lifecycle::Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, lifecycle::LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(lifecycle::LifecycleError::NoStateDir)?,
        config.log_path.file_name().ok_or(lifecycle::LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
