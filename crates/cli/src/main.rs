// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `bsdctl`: control CLI for `bsdd`, the bootstrap namespace daemon.

mod client;
mod commands;
mod env;
mod exit_error;

use clap::{Parser, Subcommand};
use exit_error::ExitError;

#[derive(Parser)]
#[command(name = "bsdctl", about = "Control CLI for bsdd, the bootstrap namespace daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Daemon liveness checks (ping, hello)
    #[command(subcommand)]
    Daemon(commands::daemon::DaemonCommand),
    /// Service declaration, check-in, registration and lookup
    #[command(subcommand)]
    Service(commands::service::ServiceCommand),
    /// Bootstrap context tree navigation and subset creation
    #[command(subcommand)]
    Job(commands::job::JobCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Daemon(cmd) => commands::daemon::daemon(cmd).await,
        Command::Service(cmd) => commands::service::service(cmd).await,
        Command::Job(cmd) => commands::job::job(cmd).await,
    };

    if let Err(e) = result {
        if let Some(exit) = e.downcast_ref::<ExitError>() {
            eprintln!("error: {exit}");
            std::process::exit(exit.code);
        }
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
