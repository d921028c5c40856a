// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bsdctl job` — bootstrap context tree navigation and subset creation.

use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::client::connect_or_exit;

#[derive(Subcommand)]
pub enum JobCommand {
    /// Create a subset of the connected job and hold it open until Ctrl-C
    Subset,
    /// Print the connected job's parent
    Parent,
    /// Mint a send right to the connected job's unprivileged port
    Unprivileged,
    /// Print the services visible from the connected job, walking up through
    /// every ancestor
    Info,
}

pub async fn job(command: JobCommand) -> Result<()> {
    let mut client = connect_or_exit().await?;
    match command {
        JobCommand::Subset => {
            let job = client.subset().await.map_err(|e| anyhow!("{e}"))?;
            println!("subset: {job}");
            println!("holding connection open — press Ctrl-C to tear it down");
            tokio::signal::ctrl_c().await?;
            // Dropping `client` closes the connection, which the daemon
            // reads as the subset requestor going away.
        }
        JobCommand::Parent => {
            let parent = client.parent().await.map_err(|e| anyhow!("{e}"))?;
            println!("{parent}");
        }
        JobCommand::Unprivileged => {
            let port = client.unprivileged().await.map_err(|e| anyhow!("{e}"))?;
            println!("port {port}");
        }
        JobCommand::Info => {
            let info = client.info().await.map_err(|e| anyhow!("{e}"))?;
            if info.names.is_empty() {
                println!("(no services)");
            }
            for ((name, program), status) in info.names.iter().zip(&info.programs).zip(&info.statuses) {
                let program = if program.is_empty() { "-" } else { program };
                println!("{name}\t{program}\t{status:?}");
            }
        }
    }
    Ok(())
}
