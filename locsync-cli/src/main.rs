//! locsync: keep every locale directory of a content tree in step with
//! its sources.
//!
//! # Usage
//!
//! ```text
//! locsync [--config locsync.yaml] translate <path> [--dry-run]
//! locsync [--config locsync.yaml] reconcile [--dry-run]
//! locsync [--config locsync.yaml] status [--json]
//! locsync [--config locsync.yaml] daemon start|stop|status|reconcile
//! ```
//!
//! Exit codes: `0` everything succeeded or was up to date, `1` at least one
//! target failed, `2` nothing could be attempted.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, reconcile::ReconcileArgs, status::StatusArgs,
    translate::TranslateArgs,
};
use locsync_core::CONFIG_FILE;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "locsync",
    version,
    about = "Mirror content documents across locale directories",
    long_about = None,
)]
struct Cli {
    /// Configuration file; relative paths inside it resolve against its directory.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate one source document into every other locale.
    Translate(TranslateArgs),

    /// Bring every document group up to date.
    Reconcile(ReconcileArgs),

    /// Show translation coverage per document group.
    Status(StatusArgs),

    /// Run or control watch mode.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Daemon {
            command: DaemonCommand::Start(_),
        } => "info",
        _ => "warn",
    };
    let json_logs = matches!(
        &cli.command,
        Commands::Daemon { command: DaemonCommand::Start(args) } if args.json_logs
    );
    locsync_daemon::init_tracing(default_level, json_logs);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(commands::EXIT_NOT_ATTEMPTED)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Translate(args) => args.run(&cli.config),
        Commands::Reconcile(args) => args.run(&cli.config),
        Commands::Status(args) => args.run(&cli.config),
        Commands::Daemon { command } => commands::daemon::run(command, &cli.config),
    }
}
