//! Document group status.
//!
//! A group is every document sharing one join key (`hello.md`) across the
//! locale directories. It is complete when each configured locale has a
//! file for it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;

use locsync_core::{DocumentStore, Locale, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocaleStatus {
    Missing,
    Source,
    /// `stale` when a source in the group was modified after this mirror.
    Mirror { stale: bool },
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleEntry {
    pub locale: Locale,
    #[serde(flatten)]
    pub status: LocaleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Path below the locale directory.
    pub key: PathBuf,
    /// One entry per configured locale, in configured order.
    pub locales: Vec<LocaleEntry>,
    pub complete: bool,
    /// Newest modification time among the group's sources.
    #[serde(skip)]
    pub source_modified: Option<SystemTime>,
}

impl GroupStatus {
    pub fn has_source(&self) -> bool {
        self.locales.iter().any(|e| e.status == LocaleStatus::Source)
    }

    pub fn stale_mirrors(&self) -> usize {
        self.locales
            .iter()
            .filter(|e| e.status == LocaleStatus::Mirror { stale: true })
            .count()
    }

    pub fn status_of(&self, locale: &str) -> Option<LocaleStatus> {
        self.locales
            .iter()
            .find(|e| e.locale.as_str() == locale)
            .map(|e| e.status)
    }
}

enum Seen {
    Source(Option<SystemTime>),
    Mirror(Option<SystemTime>),
    Invalid,
}

/// Status of every group under the store's content root, sorted by key.
pub fn collect_groups(store: &DocumentStore) -> Result<Vec<GroupStatus>, StoreError> {
    let locales = store.root().locales();
    let mut groups: BTreeMap<PathBuf, BTreeMap<Locale, Seen>> = BTreeMap::new();

    for locale in locales.codes() {
        for path in store.list_paths(locale)? {
            let seen = match store.read_path(&path) {
                Ok(doc) if doc.state.is_mirror => Seen::Mirror(doc.modified),
                Ok(doc) => Seen::Source(doc.modified),
                Err(StoreError::InvalidDocument { .. }) => Seen::Invalid,
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            };
            let key = store.root().resolve(&path)?.relative;
            groups.entry(key).or_default().insert(locale.clone(), seen);
        }
    }

    let statuses = groups
        .into_iter()
        .map(|(key, seen)| {
            let source_modified = seen
                .values()
                .filter_map(|s| match s {
                    Seen::Source(modified) => *modified,
                    _ => None,
                })
                .max();

            let entries: Vec<LocaleEntry> = locales
                .codes()
                .map(|locale| {
                    let status = match seen.get(locale) {
                        None => LocaleStatus::Missing,
                        Some(Seen::Source(_)) => LocaleStatus::Source,
                        Some(Seen::Invalid) => LocaleStatus::Invalid,
                        Some(Seen::Mirror(modified)) => LocaleStatus::Mirror {
                            stale: matches!(
                                (source_modified, modified),
                                (Some(source), Some(mirror)) if source > *mirror
                            ),
                        },
                    };
                    LocaleEntry {
                        locale: locale.clone(),
                        status,
                    }
                })
                .collect();

            GroupStatus {
                complete: entries.iter().all(|e| e.status != LocaleStatus::Missing),
                key,
                locales: entries,
                source_modified,
            }
        })
        .collect();

    Ok(statuses)
}
