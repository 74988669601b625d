// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `svpr-cli`: the thin administrative client for a supervisor's control
//! socket. Submits already-known job configuration (never parses job
//! config files of its own) and issues start/stop/remove/list/shutdown.

mod client;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use client::{ClientError, DaemonClient};
use svpr_daemon::Identity;

#[derive(Debug, Parser)]
#[command(name = "svpr-cli", about = "administrative client for a supervisor's control socket")]
struct Cli {
    /// Control socket path; defaults to this identity's well-known path.
    #[arg(long)]
    socket: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a job described by a JSON file on disk.
    Submit { config: PathBuf },
    Start { label: String },
    Stop { label: String },
    Remove { label: String },
    Get { label: String },
    List,
    BatchDisable,
    BatchEnable,
    BatchQuery,
    Shutdown,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    let socket_path = cli.socket.unwrap_or_else(|| Identity::detect(None).socket_path());

    match run(&socket_path, cli.command).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("svpr-cli: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(socket_path: &std::path::Path, command: Command) -> Result<(), ClientError> {
    let mut client = DaemonClient::connect(socket_path).await?;
    match command {
        Command::Submit { config } => {
            let bytes = std::fs::read(&config).map_err(ClientError::Io)?;
            let cfg: svpr_core::JobConfig = serde_json::from_slice(&bytes).map_err(svpr_wire::ProtocolError::Decode)?;
            client.submit(cfg).await?;
            println!("submitted");
        }
        Command::Start { label } => {
            client.start(&label).await?;
            println!("started {label}");
        }
        Command::Stop { label } => {
            client.stop(&label).await?;
            println!("stopped {label}");
        }
        Command::Remove { label } => {
            client.remove(&label).await?;
            println!("removed {label}");
        }
        Command::Get { label } => {
            let cfg = client.get_job(&label).await?;
            println!("{}", serde_json::to_string_pretty(&cfg).expect("JobConfig always serializes"));
        }
        Command::List => {
            let jobs = client.list().await?;
            let mut labels: Vec<&String> = jobs.keys().collect();
            labels.sort();
            for label in labels {
                println!("{label}");
            }
        }
        Command::BatchDisable => {
            client.batch_control(false).await?;
            println!("batch disabled");
        }
        Command::BatchEnable => {
            client.batch_control(true).await?;
            println!("batch enabled");
        }
        Command::BatchQuery => {
            let enabled = client.batch_query().await?;
            println!("{enabled}");
        }
        Command::Shutdown => {
            client.shutdown().await?;
            println!("shutdown requested");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
