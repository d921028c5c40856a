// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup and shutdown.

mod startup;
pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bsd_core::{Daemon, Handoff, Notification};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Daemon configuration: every path this process touches on disk.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. `~/.local/state/bsd`).
    pub state_dir: PathBuf,
    /// Path to the Unix socket clients connect to.
    pub socket_path: PathBuf,
    /// Path to the lock/PID file.
    pub lock_path: PathBuf,
    /// Path to the version file.
    pub version_path: PathBuf,
    /// Path to the daemon's own log file, when file logging is configured.
    pub log_path: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under `~/.local/state/bsd/` (or
    /// `$XDG_STATE_HOME/bsd/`). One daemon serves one bootstrap context.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("bsdd.sock"),
            lock_path: state_dir.join("bsdd.pid"),
            version_path: state_dir.join("bsdd.version"),
            log_path: state_dir.join("bsdd.log"),
            state_dir,
        })
    }
}

/// Daemon state during operation: everything the main loop, the demand loop,
/// and the listener need, bundled by [`startup`].
pub struct DaemonState {
    pub config: Config,
    // Held only to keep the exclusive file lock alive; released on drop.
    #[allow(dead_code)]
    lock_file: File,
    /// The bootstrap namespace, shared with every accepted connection via
    /// the listener's `ListenCtx` — matches the teacher's own
    /// `Arc<Mutex<MaterializedState>>` pattern for state touched from
    /// connection-handler tasks.
    pub daemon: Arc<Mutex<Daemon>>,
    /// Notifications (no-senders, dead-name, port-destroyed, send-once)
    /// posted by the registry and the job tree.
    pub notify_rx: mpsc::UnboundedReceiver<Notification>,
    /// Services the demand loop has observed incoming traffic for.
    pub handoff_rx: mpsc::Receiver<Handoff>,
    pub start_time: Instant,
}

/// Result of daemon startup: the state plus the listener to spawn as a task.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

impl DaemonState {
    /// Shut down gracefully: remove the socket, PID, and version files. The
    /// lock file is released automatically when `self.lock_file` is dropped.
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("shutting down");

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("failed to remove socket file: {}", e);
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("failed to remove pid file: {}", e);
            }
        }
        if self.config.version_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.version_path) {
                warn!("failed to remove version file: {}", e);
            }
        }

        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("ancestor registration with upstream failed: {0}")]
    UpstreamRegistration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
