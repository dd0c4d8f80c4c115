pub mod daemon;
pub mod reconcile;
pub mod status;
pub mod translate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use locsync_core::{DocumentStore, SyncConfig};
use locsync_sync::{BatchReport, Dispatcher, TargetOutcome};
use locsync_translate::{PassthroughTranslator, Translator};

/// The request was rejected before any target was attempted.
pub const EXIT_NOT_ATTEMPTED: u8 = 2;

pub fn load_config(path: &Path) -> Result<SyncConfig> {
    SyncConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// Dispatcher for one-shot commands. A dry run never calls the translator,
/// so it does not need provider credentials.
pub fn build_dispatcher(config: &SyncConfig, dry_run: bool) -> Result<Dispatcher> {
    let root = config.content_root().context("invalid locale configuration")?;
    let translator: Arc<dyn Translator> = if dry_run {
        Arc::new(PassthroughTranslator)
    } else {
        locsync_translate::from_config(&config.translator)
            .context("failed to set up translator")?
    };
    Ok(Dispatcher::new(DocumentStore::new(root), translator).with_dry_run(dry_run))
}

pub fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

pub fn print_batch(report: &BatchReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    if report.targets.is_empty() {
        println!("{prefix}✓ {} (no other locales)", report.source);
        return;
    }

    let mark = if report.failed() > 0 {
        "✗".red().to_string()
    } else {
        "✓".green().to_string()
    };
    let changed = if report.dry_run {
        report.would_write()
    } else {
        report.written()
    };
    println!(
        "{prefix}{mark} {} ({} {}, {} up to date, {} failed)",
        report.source,
        changed,
        if report.dry_run { "to write" } else { "written" },
        report.up_to_date(),
        report.failed(),
    );

    for target in &report.targets {
        match &target.outcome {
            TargetOutcome::Written { .. } => println!("  ✎  {}", target.path.display()),
            TargetOutcome::WouldWrite { .. } => println!("  ~  {}", target.path.display()),
            TargetOutcome::UpToDate => println!("  ·  {}", target.path.display()),
            TargetOutcome::Failed { kind, message } => println!(
                "  {}  {} [{kind}] {message}",
                "✗".red(),
                target.path.display()
            ),
        }
    }
}
