// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bsdctl service` — service declaration, check-in and lookup.

use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::client::connect_or_exit;

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Declare this job's on-demand (or always-running) server
    Server {
        /// Full command line, e.g. `-- /usr/libexec/foo --flag`
        #[arg(last = true, required = true)]
        command: Vec<String>,
        #[arg(long)]
        argv0: Option<String>,
        #[arg(long, default_value_t = 0)]
        uid: u32,
        #[arg(long)]
        on_demand: bool,
    },
    /// Declare a service name under the connected job
    Create {
        name: String,
        #[arg(long)]
        on_demand: bool,
    },
    /// Check in as the owner of a previously declared service
    CheckIn { name: String },
    /// Register (or unregister) a send right as a service's owner
    Register {
        name: String,
        #[arg(long)]
        unregister: bool,
    },
    /// Look up a single service name
    LookUp { name: String },
    /// Look up several service names in one round trip
    LookUpArray { names: Vec<String> },
    /// Report a service's reachability (inactive / active / on-demand)
    Status { name: String },
}

pub async fn service(command: ServiceCommand) -> Result<()> {
    let mut client = connect_or_exit().await?;
    match command {
        ServiceCommand::Server { command, argv0, uid, on_demand } => {
            client.create_server(command, argv0, uid, on_demand).await.map_err(|e| anyhow!("{e}"))?;
            println!("server declared");
        }
        ServiceCommand::Create { name, on_demand } => {
            let port = client.create_service(&name, on_demand).await.map_err(|e| anyhow!("{e}"))?;
            println!("{name}: port {port}");
        }
        ServiceCommand::CheckIn { name } => {
            let port = client.check_in(&name).await.map_err(|e| anyhow!("{e}"))?;
            println!("{name}: checked in, port {port}");
        }
        ServiceCommand::Register { name, unregister } => match client
            .register(&name, unregister)
            .await
            .map_err(|e| anyhow!("{e}"))?
        {
            Some(port) => println!("{name}: registered, port {port}"),
            None => println!("{name}: unregistered"),
        },
        ServiceCommand::LookUp { name } => {
            let port = client.look_up(&name).await.map_err(|e| anyhow!("{e}"))?;
            println!("{name}: port {port}");
        }
        ServiceCommand::LookUpArray { names } => {
            let results = client.look_up_array(names).await.map_err(|e| anyhow!("{e}"))?;
            for r in results {
                match r.port {
                    Some(port) => println!("{}: port {port} ({:?})", r.name, r.status),
                    None => println!("{}: absent ({:?})", r.name, r.status),
                }
            }
        }
        ServiceCommand::Status { name } => {
            let status = client.status(&name).await.map_err(|e| anyhow!("{e}"))?;
            println!("{name}: {status:?}");
        }
    }
    Ok(())
}
