// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-demand server relaunch.
//!
//! spec.md §4's on-demand trigger: the demand loop hands the main loop a
//! fired [`ServiceKey`]; if the owning job still has a launchable on-demand
//! service, [`Launcher::trigger`] spawns that job's server spec. The queued
//! message stays in its mailbox until the relaunched server checks in and
//! drains it — this module only starts the process, it never sees mailbox
//! contents.

use std::collections::HashSet;
use std::os::unix::process::CommandExt;
use std::process::ExitStatus;
use std::sync::Arc;

use bsd_core::{Daemon, JobId, ServerSpec, ServiceKey};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("server spec has an empty command")]
    EmptyCommand,
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("waiting on {command} failed: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Tracks the on-demand servers currently running, one process per job (a
/// job's server spec is shared across every service it declares — spec.md's
/// concurrent-instance policy for a single job is out of scope, so a job has
/// at most one in-flight launch at a time).
pub struct Launcher {
    running: Arc<Mutex<HashSet<JobId>>>,
}

impl Launcher {
    pub fn new() -> Self {
        Self { running: Arc::new(Mutex::new(HashSet::new())) }
    }

    pub fn is_running(&self, job: JobId) -> bool {
        self.running.lock().contains(&job)
    }

    /// Act on a demand-loop handoff: look up whether the fired service is
    /// still launchable, and if so and no instance of its job's server is
    /// already running, spawn it. A stale handoff (the service was checked
    /// in, already relaunched, or deleted between firing and this call) is
    /// silently ignored — the pending message stays queued until it fires
    /// again.
    pub fn trigger(&self, daemon: &Arc<Mutex<Daemon>>, key: &ServiceKey) {
        let Some(spec) = daemon.lock().server_to_launch(key.job, &key.service) else {
            return;
        };
        if !self.running.lock().insert(key.job) {
            return;
        }

        let job = key.job;
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            match spawn_and_wait(&spec).await {
                Ok(status) => info!(job = %job, status = %status, "on-demand server exited"),
                Err(e) => error!(job = %job, error = %e, "on-demand server failed to launch"),
            }
            running.lock().remove(&job);
        });
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn spawn_and_wait(spec: &ServerSpec) -> Result<ExitStatus, LaunchError> {
    let (program, args) = spec.command.split_first().ok_or(LaunchError::EmptyCommand)?;
    let command_label = spec.command.join(" ");

    // Built on `std::process::Command` first: `arg0`/`uid` come from
    // `std::os::unix::process::CommandExt`, which `tokio::process::Command`
    // converts from directly rather than re-exposing itself.
    let mut std_cmd = std::process::Command::new(program);
    std_cmd.args(args);
    if let Some(argv0) = &spec.argv0 {
        std_cmd.arg0(argv0);
    }
    std_cmd.uid(spec.uid);
    std_cmd.stdin(std::process::Stdio::null());

    let mut cmd = tokio::process::Command::from(std_cmd);
    let mut child =
        cmd.spawn().map_err(|source| LaunchError::Spawn { command: command_label.clone(), source })?;

    child.wait().await.map_err(|source| LaunchError::Wait { command: command_label, source })
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
