//! # locsync-sync
//!
//! The synchronization engine: decides which mirrors need regenerating,
//! drives the translator, writes stamped results and mirrors deletions.
//!
//! Call [`translate_path`] for a single source document, or
//! [`reconcile_all`] to bring every document group up to date.

pub mod deletion;
pub mod dispatcher;
pub mod error;
pub mod groups;
pub mod inflight;
pub mod pipeline;
pub mod staleness;

pub use deletion::{on_source_deleted, DeletionOutcome, DeletionReport};
pub use dispatcher::{
    BatchReport, DispatchOutcome, Dispatcher, RejectReason, TargetOutcome, TargetReport,
};
pub use error::SyncError;
pub use groups::{collect_groups, GroupStatus, LocaleStatus};
pub use inflight::{InFlight, InFlightGuard};
pub use pipeline::{reconcile_all, translate_path, ReconcileError, ReconcileReport};
pub use staleness::{needs_sync, SyncAction, SyncMode};
