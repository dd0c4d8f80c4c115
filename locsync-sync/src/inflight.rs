//! In-flight deduplication of source paths.
//!
//! At most one batch per source path runs at a time. A second event for a
//! path that is already being processed is dropped, not queued; the drop is
//! counted so that watch-mode status can report it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    paths: Mutex<HashSet<PathBuf>>,
    dropped: AtomicU64,
}

/// Shared set of source paths with an outstanding batch. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<Inner>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn paths(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked.
        self.inner
            .paths
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Atomically insert `path`. Returns `false` (and counts a drop) when it
    /// was already present.
    pub fn try_admit(&self, path: &Path) -> bool {
        let admitted = self.paths().insert(path.to_path_buf());
        if !admitted {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(path = %path.display(), "already in flight, dropping event");
        }
        admitted
    }

    pub fn release(&self, path: &Path) {
        self.paths().remove(path);
    }

    /// Scoped admission; the path is released when the guard drops, on every
    /// exit path including panics and task cancellation.
    pub fn admit(&self, path: &Path) -> Option<InFlightGuard> {
        self.try_admit(path).then(|| InFlightGuard {
            set: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths().contains(path)
    }

    /// In-flight paths, sorted.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.paths().iter().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.paths().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths().is_empty()
    }

    /// Events dropped because their path was already in flight.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// Releases its path from the [`InFlight`] set on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlight,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.path);
    }
}
