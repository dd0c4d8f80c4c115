//! Directory watcher adapter.
//!
//! Raw `notify` events are reduced to paths and held in a [`Stabilizer`].
//! A path is emitted once no raw event has arrived for it for the stability
//! threshold, so an editor's write burst becomes one event. The kind is
//! decided at emission time from the filesystem and the set of paths the
//! watcher already knows about:
//!
//! | on disk | known | emitted                       |
//! |---------|-------|-------------------------------|
//! | yes     | yes   | `Change` if the mtime moved   |
//! | yes     | no    | `Add`                         |
//! | no      | yes   | `Unlink`                      |
//! | no      | no    | nothing                       |
//!
//! Permission, ownership and xattr changes are dropped as raw events.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::event::{MetadataKind, ModifyKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use locsync_core::{ContentRoot, DocumentStore};

use crate::error::{io_err, DaemonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    Add,
    Change,
    Unlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stabilizer
// ---------------------------------------------------------------------------

/// Per-path write-stability tracking plus the known-path set.
#[derive(Debug)]
pub struct Stabilizer {
    threshold: Duration,
    pending: HashMap<PathBuf, Instant>,
    /// Known paths with the mtime last emitted for them.
    known: HashMap<PathBuf, Option<SystemTime>>,
}

impl Stabilizer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: HashMap::new(),
            known: HashMap::new(),
        }
    }

    /// A raw event touched `path` at `now`; restarts its quiet period.
    pub fn record(&mut self, path: &Path, now: Instant) {
        self.pending.insert(path.to_path_buf(), now);
    }

    pub fn mark_known(&mut self, path: &Path, modified: Option<SystemTime>) {
        self.known.insert(path.to_path_buf(), modified);
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.known.contains_key(path)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// When the earliest pending path becomes stable.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|seen| *seen + self.threshold).min()
    }

    /// Remove and return every path quiet for at least the threshold, sorted.
    pub fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let threshold = self.threshold;
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= threshold)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    /// Decide the event kind for a stable path and update the known set.
    /// `modified` is the file's mtime, `None` when it is gone.
    pub fn classify(&mut self, path: &Path, modified: Option<SystemTime>) -> Option<WatchKind> {
        match (modified, self.known.get(path).copied()) {
            (Some(mtime), Some(last)) => {
                if last == Some(mtime) {
                    return None;
                }
                self.known.insert(path.to_path_buf(), Some(mtime));
                Some(WatchKind::Change)
            }
            (Some(mtime), None) => {
                self.known.insert(path.to_path_buf(), Some(mtime));
                Some(WatchKind::Add)
            }
            (None, Some(_)) => {
                self.known.remove(path);
                Some(WatchKind::Unlink)
            }
            (None, None) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Initial scan
// ---------------------------------------------------------------------------

/// An `Add` for every document already present, in locale order.
pub fn initial_scan(store: &DocumentStore) -> Result<Vec<WatchEvent>, DaemonError> {
    let mut events = Vec::new();
    for locale in store.root().locales().codes() {
        for path in store.list_paths(locale)? {
            events.push(WatchEvent::new(WatchKind::Add, path));
        }
    }
    Ok(events)
}

// ---------------------------------------------------------------------------
// Watcher task
// ---------------------------------------------------------------------------

/// Watch `root` recursively and send stable [`WatchEvent`]s to `events_tx`.
///
/// `initial` is sent first and seeds the known-path set.
pub async fn watch(
    root: ContentRoot,
    threshold: Duration,
    initial: Vec<WatchEvent>,
    events_tx: mpsc::Sender<WatchEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root_dir = root.path().to_path_buf();
    if !root_dir.exists() {
        fs::create_dir_all(&root_dir).map_err(|e| io_err(&root_dir, e))?;
    }

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = raw_tx.send(event);
    })?;
    watcher.watch(&root_dir, RecursiveMode::Recursive)?;
    tracing::info!("watching {}", root_dir.display());

    let mut stabilizer = Stabilizer::new(threshold);
    for event in initial {
        stabilizer.mark_known(&event.path, file_mtime(&event.path));
        if events_tx.send(event).await.is_err() {
            return Err(DaemonError::ChannelClosed("watch events"));
        }
    }

    loop {
        let deadline = stabilizer.next_deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            raw = raw_rx.recv() => {
                let Some(raw) = raw else { break };
                let event = match raw {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                let now = Instant::now();
                for path in event.paths {
                    if is_watched_document(&root, &path) {
                        stabilizer.record(&path, now);
                    }
                }
            }
            _ = sleep_until(deadline), if deadline.is_some() => {
                for path in stabilizer.take_ready(Instant::now()) {
                    let Some(kind) = stabilizer.classify(&path, file_mtime(&path)) else {
                        continue;
                    };
                    tracing::debug!(path = %path.display(), kind = ?kind, "stable");
                    if events_tx.send(WatchEvent { kind, path }).await.is_err() {
                        return Err(DaemonError::ChannelClosed("watch events"));
                    }
                }
            }
        }
    }

    drop(watcher);
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Metadata(meta)) => !matches!(
            meta,
            MetadataKind::Permissions | MetadataKind::Ownership | MetadataKind::Extended
        ),
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any => true,
        _ => false,
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .and_then(|meta| meta.modified().ok())
}

/// Document files under a locale directory; temp files and other
/// extensions are ignored.
fn is_watched_document(root: &ContentRoot, path: &Path) -> bool {
    root.resolve(path).is_ok()
}
