// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bsdctl ping` / `bsdctl hello` — ambient daemon liveness commands.

use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::client::connect_or_exit;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Check the daemon is alive
    Ping,
    /// Print the daemon's protocol version
    Hello,
}

pub async fn daemon(command: DaemonCommand) -> Result<()> {
    let mut client = connect_or_exit().await?;
    match command {
        DaemonCommand::Ping => {
            client.ping().await.map_err(|e| anyhow!("{e}"))?;
            println!("pong");
        }
        DaemonCommand::Hello => {
            let version = client.hello().await.map_err(|e| anyhow!("{e}"))?;
            println!("bsdd {version}");
        }
    }
    Ok(())
}
