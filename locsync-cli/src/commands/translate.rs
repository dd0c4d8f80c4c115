//! `locsync translate`: one source document into every other locale.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use locsync_sync::{translate_path, DispatchOutcome};

use super::{block_on, build_dispatcher, load_config, print_batch};

/// Arguments for `locsync translate`.
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Source document, e.g. `src/content/blog/ru/hello.md`.
    pub path: PathBuf,

    /// Report what would be written without calling the translator.
    #[arg(long)]
    pub dry_run: bool,
}

impl TranslateArgs {
    pub fn run(self, config_path: &Path) -> Result<u8> {
        let config = load_config(config_path)?;
        let dispatcher = build_dispatcher(&config, self.dry_run)?;

        let outcome = block_on(translate_path(&dispatcher, &self.path))?
            .with_context(|| format!("failed to translate {}", self.path.display()))?;

        match &outcome {
            DispatchOutcome::Rejected { path, reason } => {
                eprintln!("{} {}: {reason}", "✗".red(), path.display());
            }
            DispatchOutcome::Settled(report) => print_batch(report),
        }
        Ok(outcome.exit_code())
    }
}
