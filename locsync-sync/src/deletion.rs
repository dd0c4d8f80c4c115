//! Deletion propagation.
//!
//! Removing `ru/hello.md` removes `en/hello.md` and `uz/hello.md`. The
//! counterparts are deleted whether or not they carry the marker.

use std::path::{Path, PathBuf};

use serde::Serialize;

use locsync_core::{DocumentStore, Locale, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted,
    /// Nothing to delete; not an error.
    Absent,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionTarget {
    pub locale: Locale,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: DeletionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// `ru/hello.md`
    pub source: String,
    pub targets: Vec<DeletionTarget>,
}

impl DeletionReport {
    pub fn deleted(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.outcome == DeletionOutcome::Deleted)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, DeletionOutcome::Failed { .. }))
            .count()
    }
}

/// Delete the counterparts of the removed source at `path` in every other
/// locale. Path resolution failures are errors; per-target failures are
/// recorded in the report.
pub fn on_source_deleted(store: &DocumentStore, path: &Path) -> Result<DeletionReport, StoreError> {
    let root = store.root();
    let source = root.resolve(path)?;

    let mut targets = Vec::new();
    for target in root.locales().others(&source.locale) {
        let (path, outcome) = match root.mirror(&source, &target.code) {
            Ok(location) => {
                let outcome = match store.delete_document(&location) {
                    Ok(()) => {
                        tracing::info!("deleted {}", location.key());
                        DeletionOutcome::Deleted
                    }
                    Err(StoreError::NotFound { .. }) => DeletionOutcome::Absent,
                    Err(err) => {
                        tracing::error!(mirror = %location.key(), "delete failed: {err}");
                        DeletionOutcome::Failed {
                            message: err.to_string(),
                        }
                    }
                };
                (location.absolute, outcome)
            }
            Err(err) => (
                root.locale_dir(&target.code).join(&source.relative),
                DeletionOutcome::Failed {
                    message: err.to_string(),
                },
            ),
        };
        targets.push(DeletionTarget {
            locale: target.code.clone(),
            path,
            outcome,
        });
    }

    Ok(DeletionReport {
        source: source.key(),
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use locsync_core::{ContentRoot, LocaleSet};
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> DocumentStore {
        DocumentStore::new(ContentRoot::new(tmp.path(), LocaleSet::default(), "md"))
    }

    #[test]
    fn deletes_present_counterparts_and_reports_absent_ones() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("en")).unwrap();
        fs::write(tmp.path().join("en/hello.md"), "---\ntranslated: true\n---\n").unwrap();

        let store = store(&tmp);
        let report = on_source_deleted(&store, &tmp.path().join("ru/hello.md")).unwrap();

        assert_eq!(report.source, "ru/hello.md");
        let outcomes: Vec<_> = report
            .targets
            .iter()
            .map(|t| (t.locale.as_str(), t.outcome.clone()))
            .collect();
        assert_eq!(
            outcomes,
            vec![("en", DeletionOutcome::Deleted), ("uz", DeletionOutcome::Absent)]
        );
        assert!(!tmp.path().join("en/hello.md").exists());
        assert_eq!(report.deleted(), 1);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn counterparts_are_deleted_without_marker_check() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("uz")).unwrap();
        fs::write(tmp.path().join("uz/post.md"), "---\ntitle: human\n---\n").unwrap();

        let report = on_source_deleted(&store(&tmp), &tmp.path().join("ru/post.md")).unwrap();
        assert_eq!(report.deleted(), 1);
        assert!(!tmp.path().join("uz/post.md").exists());
    }

    #[test]
    fn unresolvable_path_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = on_source_deleted(&store(&tmp), &tmp.path().join("fr/post.md")).unwrap_err();
        assert!(matches!(err, StoreError::LocaleUnresolvable { .. }));
    }
}
