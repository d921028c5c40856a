// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

/// Resolve state directory: BSD_STATE_DIR > XDG_STATE_HOME/bsd > ~/.local/state/bsd
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("BSD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("bsd"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/bsd"))
}

/// Default IPC timeout
pub fn ipc_timeout() -> Duration {
    std::env::var("BSD_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Shutdown drain timeout (default 5s, configurable via `BSD_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("BSD_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Path to the socket of the bootstrap context this daemon should register
/// itself under as a child subset at startup. Unset for the root daemon.
pub fn upstream_socket() -> Option<PathBuf> {
    std::env::var("BSD_UPSTREAM_SOCKET").ok().map(PathBuf::from)
}

/// Whether this process is PID 1 (running as the system's init process).
/// Relaxes `create_server`'s caller-UID check (spec.md §4.4/§8).
pub fn is_pid1() -> bool {
    nix::unistd::getpid() == nix::unistd::Pid::from_raw(1)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
