//! `locsync daemon`: watch mode lifecycle over the control socket.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use locsync_daemon::{
    request_reconcile, request_status, request_stop, socket_path, start_blocking, DaemonError,
};

use super::{load_config, EXIT_NOT_ATTEMPTED};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run watch mode in the foreground (watcher + socket server).
    Start(DaemonStartArgs),
    /// Request graceful shutdown over the control socket.
    Stop,
    /// Query runtime status over the control socket.
    Status,
    /// Ask the running daemon for a reconciliation pass.
    Reconcile,
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

pub fn run(command: DaemonCommand, config_path: &Path) -> Result<u8> {
    let config = load_config(config_path)?;
    let state_dir = config.state_dir.clone();

    match command {
        DaemonCommand::Start(_) => {
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&state_dir) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let status = match request_status(&state_dir) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&state_dir).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Reconcile => {
            let totals = match request_reconcile(&state_dir) {
                Ok(totals) => totals,
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    eprintln!("daemon is not running; use `locsync reconcile` instead");
                    return Ok(EXIT_NOT_ATTEMPTED);
                }
                Err(err) => return Err(err).context("daemon reconcile failed"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&totals)
                    .context("failed to render reconcile JSON")?
            );
            let code = totals["exit_code"].as_u64().unwrap_or(0);
            return Ok(u8::try_from(code).unwrap_or(1));
        }
    }

    Ok(0)
}
