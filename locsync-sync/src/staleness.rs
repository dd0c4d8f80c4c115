//! Staleness evaluation.
//!
//! | mode             | target absent | target present                    |
//! |------------------|---------------|-----------------------------------|
//! | `Add`            | create        | skip                              |
//! | `Change`         | create        | update                            |
//! | `BackgroundScan` | create        | update iff source mtime > target  |
//!
//! Human-authored targets are not special-cased; a present target is
//! overwritten whenever the mode says so.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use locsync_core::{Document, TargetState};

/// Which kind of event produced the sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// A document appeared (watcher add, initial scan).
    Add,
    /// A document was edited; its mirrors are regenerated unconditionally.
    Change,
    /// Reconciliation pass; regenerates missing or out-of-date mirrors.
    BackgroundScan,
}

/// What to do for one target locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Skip,
}

/// Whether `target` must be (re)generated from `source`.
pub fn needs_sync(source: &Document, target: TargetState, mode: SyncMode) -> bool {
    match (mode, target) {
        (_, TargetState::Absent) => true,
        (SyncMode::Add, TargetState::Present { .. }) => false,
        (SyncMode::Change, TargetState::Present { .. }) => true,
        (SyncMode::BackgroundScan, TargetState::Present { modified }) => match source.modified {
            Some(source_modified) => source_modified > modified,
            // Never read from disk, so no evidence the target is current.
            None => true,
        },
    }
}

/// [`needs_sync`] expressed as an action.
pub fn decide(source: &Document, target: TargetState, mode: SyncMode) -> SyncAction {
    if !needs_sync(source, target, mode) {
        return SyncAction::Skip;
    }
    match target {
        TargetState::Absent => SyncAction::Create,
        TargetState::Present { .. } => SyncAction::Update,
    }
}

/// Format age from a filesystem timestamp (`42s`, `5m`, `3h`, `2d`).
pub fn format_system_time_age(timestamp: SystemTime) -> String {
    let age = SystemTime::now()
        .duration_since(timestamp)
        .unwrap_or_default();
    format_duration(age)
}

pub fn format_duration(duration: Duration) -> String {
    format_seconds(duration.as_secs())
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
