// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Paths the CLI needs to find the running daemon, mirroring
//! `bsd_daemon::env`'s own resolution order.

use std::path::PathBuf;

use bsd_daemon::lifecycle::LifecycleError;

pub fn socket_path() -> Result<PathBuf, LifecycleError> {
    Ok(bsd_daemon::env::state_dir()?.join("bsdd.sock"))
}

pub fn lock_path() -> Result<PathBuf, LifecycleError> {
    Ok(bsd_daemon::env::state_dir()?.join("bsdd.pid"))
}
