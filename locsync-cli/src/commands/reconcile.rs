//! `locsync reconcile`: bring every document group up to date.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use locsync_sync::{reconcile_all, BatchReport};

use super::{block_on, build_dispatcher, load_config, print_batch};

/// Arguments for `locsync reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Report what would be written without calling the translator.
    #[arg(long)]
    pub dry_run: bool,
}

impl ReconcileArgs {
    pub fn run(self, config_path: &Path) -> Result<u8> {
        let config = load_config(config_path)?;
        let dispatcher = build_dispatcher(&config, self.dry_run)?;

        let report = block_on(reconcile_all(&dispatcher))?.context("reconcile failed")?;

        let changed: Vec<&BatchReport> = report
            .batches
            .iter()
            .filter(|batch| batch.up_to_date() < batch.targets.len())
            .collect();
        for batch in &changed {
            print_batch(batch);
        }
        for rejection in &report.rejected {
            println!(
                "  {}  {}: {}",
                "!".yellow(),
                rejection.path.display(),
                rejection.reason
            );
        }
        for error in &report.errors {
            eprintln!(
                "  {}  {}: [{}] {}",
                "✗".red(),
                error.path.display(),
                error.kind,
                error.message
            );
        }

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        let written = if self.dry_run {
            report.would_write()
        } else {
            report.written()
        };
        if changed.is_empty() && report.errors.is_empty() {
            println!(
                "{prefix}✓ {} documents scanned, nothing to do",
                report.scanned
            );
        } else {
            println!(
                "{prefix}{} documents scanned, {} {}, {} up to date, {} failed, {} unreadable",
                report.scanned,
                written,
                if self.dry_run { "to write" } else { "written" },
                report.up_to_date(),
                report.failed(),
                report.errors.len(),
            );
        }

        Ok(report.exit_code())
    }
}
