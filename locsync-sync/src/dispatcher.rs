//! Translation dispatcher.
//!
//! ## Batch protocol
//!
//! 1. Resolve the path (containment, extension, locale) before any I/O.
//! 2. Read the source; missing, invalid and mirror documents are rejected.
//! 3. Admit the path into the in-flight set; a path already in flight is
//!    rejected. The guard releases it on every exit path.
//! 4. For each other locale, in configured order: mirror path, staleness,
//!    `translate`, parse the output, stamp the marker, atomic write.
//!    A failure is recorded for that locale and the next one proceeds.
//! 5. Log the locales that succeeded and return the [`BatchReport`].
//!
//! Targets of one batch are processed sequentially. Batches for different
//! documents may run concurrently on separate tasks.
//!
//! The target is checked, then written after the translate call returns; a
//! second edit landing in between is not detected.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use locsync_core::{
    stamp_translated, Document, DocumentPath, DocumentStore, Locale, LocaleSet, LocaleSpec,
    StoreError, TargetState,
};
use locsync_translate::Translator;

use crate::error::SyncError;
use crate::inflight::InFlight;
use crate::staleness::{decide, SyncAction, SyncMode};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an event did not produce a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    NotADocument,
    PathEscape,
    LocaleUnresolvable,
    SourceMissing,
    InvalidDocument(String),
    /// The document carries the marker; mirrors never propagate outward.
    Mirror,
    InFlight,
}

impl RejectReason {
    fn from_resolve(err: &StoreError) -> Option<Self> {
        match err {
            StoreError::NotADocument { .. } => Some(Self::NotADocument),
            StoreError::PathEscape { .. } => Some(Self::PathEscape),
            StoreError::LocaleUnresolvable { .. } => Some(Self::LocaleUnresolvable),
            StoreError::NotFound { .. } => Some(Self::SourceMissing),
            StoreError::InvalidDocument { source, .. } => {
                Some(Self::InvalidDocument(source.to_string()))
            }
            StoreError::Io { .. } => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotADocument => f.write_str("not a document file"),
            RejectReason::PathEscape => f.write_str("path escapes the content root"),
            RejectReason::LocaleUnresolvable => f.write_str("no configured locale for path"),
            RejectReason::SourceMissing => f.write_str("source document not found"),
            RejectReason::InvalidDocument(detail) => write!(f, "invalid document: {detail}"),
            RejectReason::Mirror => f.write_str("document is a translation"),
            RejectReason::InFlight => f.write_str("already being processed"),
        }
    }
}

/// Result for one target locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Written { action: SyncAction },
    /// Dry run: the target would have been translated and written.
    WouldWrite { action: SyncAction },
    UpToDate,
    Failed { kind: String, message: String },
}

impl TargetOutcome {
    fn failed(kind: &str, message: impl fmt::Display) -> Self {
        TargetOutcome::Failed {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TargetOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub locale: Locale,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

/// Everything one settled batch did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// `ru/hello.md`
    pub source: String,
    pub source_locale: Locale,
    pub mode: SyncMode,
    pub dry_run: bool,
    pub targets: Vec<TargetReport>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Written { .. }))
    }

    pub fn would_write(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::WouldWrite { .. }))
    }

    pub fn up_to_date(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::UpToDate))
    }

    pub fn failed(&self) -> usize {
        self.count(TargetOutcome::is_failure)
    }

    /// Locales whose target was written (or would be, in a dry run).
    pub fn succeeded_locales(&self) -> Vec<&Locale> {
        self.targets
            .iter()
            .filter(|t| {
                matches!(
                    t.outcome,
                    TargetOutcome::Written { .. } | TargetOutcome::WouldWrite { .. }
                )
            })
            .map(|t| &t.locale)
            .collect()
    }

    /// `0` when nothing failed, `1` when any attempted target failed.
    pub fn exit_code(&self) -> u8 {
        if self.failed() > 0 {
            1
        } else {
            0
        }
    }

    fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.targets.iter().filter(|t| pred(&t.outcome)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Rejected { path: PathBuf, reason: RejectReason },
    Settled(BatchReport),
}

impl DispatchOutcome {
    /// `2` for a rejected request, otherwise the batch's exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            DispatchOutcome::Rejected { .. } => 2,
            DispatchOutcome::Settled(report) => report.exit_code(),
        }
    }

    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            DispatchOutcome::Settled(report) => Some(report),
            DispatchOutcome::Rejected { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Turns a source-path event into translated, stamped mirrors.
#[derive(Clone)]
pub struct Dispatcher {
    store: DocumentStore,
    translator: Arc<dyn Translator>,
    in_flight: InFlight,
    dry_run: bool,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("root", &self.store.root().path())
            .field("translator", &self.translator.provider_name())
            .field("in_flight", &self.in_flight.len())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(store: DocumentStore, translator: Arc<dyn Translator>) -> Self {
        Self {
            store,
            translator,
            in_flight: InFlight::new(),
            dry_run: false,
        }
    }

    /// Compute decisions without calling the translator or writing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn locales(&self) -> &LocaleSet {
        self.store.root().locales()
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run one batch for the source at `path`.
    ///
    /// Rejections are `Ok(Rejected)`. Only a source read I/O failure (or a
    /// failed blocking task) is an `Err`.
    pub async fn dispatch(&self, path: &Path, mode: SyncMode) -> Result<DispatchOutcome, SyncError> {
        let location = match self.store.root().resolve(path) {
            Ok(location) => location,
            Err(err) => return self.reject(path, err),
        };

        let store = self.store.clone();
        let read_at = location.clone();
        let source = match tokio::task::spawn_blocking(move || store.read_document(&read_at)).await? {
            Ok(doc) => doc,
            Err(err) => return self.reject(&location.absolute, err),
        };

        if source.state.is_mirror {
            tracing::debug!(path = %location.key(), "skipping translated document");
            return Ok(rejected(&location.absolute, RejectReason::Mirror));
        }

        let Some(_guard) = self.in_flight.admit(&location.absolute) else {
            return Ok(rejected(&location.absolute, RejectReason::InFlight));
        };

        let report = self.run_batch(&source, mode).await;

        let succeeded: Vec<&str> = report
            .succeeded_locales()
            .into_iter()
            .map(Locale::as_str)
            .collect();
        if self.dry_run {
            tracing::info!("[dry-run] {}: would translate to {:?}", report.source, succeeded);
        } else if !succeeded.is_empty() {
            tracing::info!("translated {} to {}", report.source, succeeded.join(", "));
        }
        if report.failed() > 0 {
            tracing::warn!(
                source = %report.source,
                failed = report.failed(),
                "batch settled with failures"
            );
        }

        Ok(DispatchOutcome::Settled(report))
    }

    fn reject(&self, path: &Path, err: StoreError) -> Result<DispatchOutcome, SyncError> {
        match RejectReason::from_resolve(&err) {
            Some(reason) => {
                tracing::debug!(path = %path.display(), %reason, "event rejected");
                Ok(rejected(path, reason))
            }
            None => Err(err.into()),
        }
    }

    async fn run_batch(&self, source: &Document, mode: SyncMode) -> BatchReport {
        let source_locale = source.locale().clone();
        let mut targets = Vec::with_capacity(self.locales().len().saturating_sub(1));

        let Some(source_spec) = self.locales().get(source_locale.as_str()).cloned() else {
            return BatchReport {
                source: source.location.key(),
                source_locale,
                mode,
                dry_run: self.dry_run,
                targets,
            };
        };

        let source_text = source.render();
        let target_specs: Vec<LocaleSpec> = self.locales().others(&source_locale).cloned().collect();

        for target in &target_specs {
            let (path, outcome) = match self.store.root().mirror(&source.location, &target.code) {
                Ok(location) => {
                    let outcome = self
                        .sync_target(source, &source_text, &source_spec, target, &location, mode)
                        .await;
                    (location.absolute, outcome)
                }
                Err(err) => (
                    self.store.root().locale_dir(&target.code).join(&source.location.relative),
                    TargetOutcome::failed(err.kind(), &err),
                ),
            };
            if let TargetOutcome::Failed { kind, message } = &outcome {
                tracing::error!(
                    source = %source.location.key(),
                    locale = %target.code,
                    kind = %kind,
                    "translation failed: {message}"
                );
            }
            targets.push(TargetReport {
                locale: target.code.clone(),
                path,
                outcome,
            });
        }

        BatchReport {
            source: source.location.key(),
            source_locale,
            mode,
            dry_run: self.dry_run,
            targets,
        }
    }

    async fn sync_target(
        &self,
        source: &Document,
        source_text: &str,
        source_spec: &LocaleSpec,
        target: &LocaleSpec,
        location: &DocumentPath,
        mode: SyncMode,
    ) -> TargetOutcome {
        let state = match self.blocking_target_state(location).await {
            Ok(state) => state,
            Err(err) => return TargetOutcome::failed("io", err),
        };

        let action = decide(source, state, mode);
        if action == SyncAction::Skip {
            tracing::debug!(mirror = %location.key(), "up to date");
            return TargetOutcome::UpToDate;
        }
        if self.dry_run {
            return TargetOutcome::WouldWrite { action };
        }

        let output = match self.translator.translate(source_text, source_spec, target).await {
            Ok(output) => output,
            Err(err) => return TargetOutcome::failed(err.kind(), &err),
        };

        let translated = match Document::from_text(location.clone(), &output) {
            Ok(doc) => doc,
            Err(err) => return TargetOutcome::failed("invalid_output", err),
        };
        let stamped = stamp_translated(&translated);

        let store = self.store.clone();
        let write_at = location.clone();
        match tokio::task::spawn_blocking(move || store.write_document(&write_at, &stamped)).await {
            Ok(Ok(())) => TargetOutcome::Written { action },
            Ok(Err(err)) => TargetOutcome::failed(err.kind(), &err),
            Err(err) => TargetOutcome::failed("task", err),
        }
    }

    async fn blocking_target_state(&self, location: &DocumentPath) -> Result<TargetState, SyncError> {
        let store = self.store.clone();
        let at = location.clone();
        Ok(tokio::task::spawn_blocking(move || store.target_state(&at)).await??)
    }
}

fn rejected(path: &Path, reason: RejectReason) -> DispatchOutcome {
    DispatchOutcome::Rejected {
        path: path.to_path_buf(),
        reason,
    }
}
