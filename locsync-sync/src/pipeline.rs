//! Reconciliation and one-shot translation.
//!
//! [`reconcile_all`] walks every locale in configured order and dispatches
//! each source document in `BackgroundScan` mode. Mirrors written while
//! processing an earlier locale are seen as mirrors when their own locale is
//! listed, so a single pass never translates its own output. A second pass
//! with no source edits writes nothing. An unreadable locale directory or
//! document is recorded in the report and the pass moves on.

use std::path::{Path, PathBuf};

use serde::Serialize;

use locsync_core::StoreError;

use crate::dispatcher::{BatchReport, DispatchOutcome, Dispatcher, RejectReason};
use crate::error::SyncError;
use crate::staleness::SyncMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub path: PathBuf,
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// A locale directory or document the pass could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileError {
    pub path: PathBuf,
    pub kind: String,
    pub message: String,
}

/// Aggregate of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Valid documents seen, sources and mirrors.
    pub scanned: usize,
    pub mirrors_skipped: usize,
    pub batches: Vec<BatchReport>,
    pub rejected: Vec<Rejection>,
    pub errors: Vec<ReconcileError>,
}

impl ReconcileReport {
    pub fn written(&self) -> usize {
        self.batches.iter().map(BatchReport::written).sum()
    }

    pub fn would_write(&self) -> usize {
        self.batches.iter().map(BatchReport::would_write).sum()
    }

    pub fn up_to_date(&self) -> usize {
        self.batches.iter().map(BatchReport::up_to_date).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(BatchReport::failed).sum()
    }

    /// `1` when any target failed or anything was unreadable, otherwise `0`.
    pub fn exit_code(&self) -> u8 {
        let batches = self
            .batches
            .iter()
            .map(BatchReport::exit_code)
            .max()
            .unwrap_or(0);
        if self.errors.is_empty() {
            batches
        } else {
            batches.max(1)
        }
    }

    fn record_error(&mut self, path: &Path, err: &StoreError) {
        tracing::error!(path = %path.display(), kind = err.kind(), "reconcile: {err}");
        self.errors.push(ReconcileError {
            path: path.to_path_buf(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }

    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Settled(report) => self.batches.push(report),
            DispatchOutcome::Rejected { path, reason } => {
                self.rejected.push(Rejection { path, reason })
            }
        }
    }
}

/// Bring every document group up to date.
pub async fn reconcile_all(dispatcher: &Dispatcher) -> Result<ReconcileReport, SyncError> {
    let mut report = ReconcileReport::default();
    let locales: Vec<_> = dispatcher.locales().codes().cloned().collect();

    for locale in locales {
        let store = dispatcher.store().clone();
        let listed = locale.clone();
        let paths = match tokio::task::spawn_blocking(move || store.list_paths(&listed)).await? {
            Ok(paths) => paths,
            Err(err) => {
                report.record_error(&dispatcher.store().root().locale_dir(&locale), &err);
                continue;
            }
        };

        tracing::debug!(locale = %locale, documents = paths.len(), "reconciling locale");

        for path in paths {
            let store = dispatcher.store().clone();
            let read_at = path.clone();
            let doc = match tokio::task::spawn_blocking(move || store.read_path(&read_at)).await? {
                Ok(doc) => doc,
                Err(err @ StoreError::InvalidDocument { .. }) => {
                    tracing::warn!(error = %err, "skipping invalid document");
                    continue;
                }
                // Removed between listing and reading.
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => {
                    report.record_error(&path, &err);
                    continue;
                }
            };

            report.scanned += 1;
            if doc.state.is_mirror {
                report.mirrors_skipped += 1;
                continue;
            }
            match dispatcher
                .dispatch(&doc.location.absolute, SyncMode::BackgroundScan)
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(SyncError::Store(err)) => report.record_error(&path, &err),
                Err(err) => return Err(err),
            }
        }
    }

    tracing::info!(
        "reconcile: {} scanned, {} written, {} up to date, {} failed, {} unreadable",
        report.scanned,
        report.written(),
        report.up_to_date(),
        report.failed(),
        report.errors.len()
    );
    Ok(report)
}

/// Translate one source document into every other locale, regardless of
/// the targets' timestamps.
pub async fn translate_path(
    dispatcher: &Dispatcher,
    path: &Path,
) -> Result<DispatchOutcome, SyncError> {
    dispatcher.dispatch(path, SyncMode::Change).await
}
