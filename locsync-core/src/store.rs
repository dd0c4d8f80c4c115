//! Document store accessor.
//!
//! ## `write_document` atomic protocol
//!
//! 1. Ensure the locale directory exists.
//! 2. Write the rendered document to `<path>.locsync.tmp`.
//! 3. Rename over the final path (atomic on POSIX).
//! 4. On rename failure remove the temp file; the original stays intact.
//!
//! Readers therefore never observe a half-written header block.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{io_err, FrontmatterError, StoreError};
use crate::frontmatter::Frontmatter;
use crate::paths::{ContentRoot, DocumentPath};
use crate::types::{Document, Locale};

/// Suffix appended to a document path for the in-progress write.
pub const TMP_SUFFIX: &str = "locsync.tmp";

/// Whether a target document exists, and if so how fresh it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Absent,
    Present { modified: SystemTime },
}

/// Filesystem-backed access to documents under a [`ContentRoot`].
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: ContentRoot,
}

impl DocumentStore {
    pub fn new(root: ContentRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ContentRoot {
        &self.root
    }

    /// Documents directly under `<root>/<locale>`, in file-name order.
    ///
    /// Invalid documents are logged and skipped. A missing locale directory
    /// yields an empty sequence. Call again to restart.
    pub fn list_documents(&self, locale: &Locale) -> Result<DocumentIter, StoreError> {
        let files = self.list_paths(locale)?;
        Ok(DocumentIter {
            store: self.clone(),
            pending: files.into_iter(),
        })
    }

    /// Document file paths directly under `<root>/<locale>`, sorted, without
    /// reading them.
    pub fn list_paths(&self, locale: &Locale) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.root.locale_dir(locale);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(&dir, err)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            let path = entry.path();
            if ty.is_file() && self.root.is_document_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Resolve `path` against the content root and read it.
    pub fn read_path(&self, path: &Path) -> Result<Document, StoreError> {
        let location = self.root.resolve(path)?;
        self.read_document(&location)
    }

    pub fn read_document(&self, location: &DocumentPath) -> Result<Document, StoreError> {
        let path = &location.absolute;
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound { path: path.clone() })
            }
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Err(StoreError::InvalidDocument {
                    path: path.clone(),
                    source: FrontmatterError::NotUtf8,
                })
            }
            Err(err) => return Err(io_err(path, err)),
        };
        let modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| io_err(path, e))?;

        let frontmatter = Frontmatter::parse(&text).map_err(|source| StoreError::InvalidDocument {
            path: path.clone(),
            source,
        })?;
        Ok(Document::new(location.clone(), frontmatter, Some(modified)))
    }

    /// Atomically write `doc` to `location`, creating parent directories.
    pub fn write_document(&self, location: &DocumentPath, doc: &Document) -> Result<(), StoreError> {
        let tmp = tmp_path(&location.absolute);
        self.write_with_tmp(location, doc, &tmp)
    }

    fn write_with_tmp(
        &self,
        location: &DocumentPath,
        doc: &Document,
        tmp: &Path,
    ) -> Result<(), StoreError> {
        let path = &location.absolute;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        if let Some(tmp_parent) = tmp.parent() {
            std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
        }

        std::fs::write(tmp, doc.render()).map_err(|e| io_err(tmp, e))?;

        if let Err(e) = std::fs::rename(tmp, path) {
            let _ = std::fs::remove_file(tmp);
            return Err(io_err(path, e));
        }

        tracing::debug!(path = %path.display(), "wrote document");
        Ok(())
    }

    pub fn delete_document(&self, location: &DocumentPath) -> Result<(), StoreError> {
        let path = &location.absolute;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { path: path.clone() })
            }
            Err(err) => Err(io_err(path, err)),
        }
    }

    pub fn target_state(&self, location: &DocumentPath) -> Result<TargetState, StoreError> {
        let path = &location.absolute;
        match std::fs::metadata(path) {
            Ok(meta) => {
                let modified = meta.modified().map_err(|e| io_err(path, e))?;
                Ok(TargetState::Present { modified })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(TargetState::Absent),
            Err(err) => Err(io_err(path, err)),
        }
    }
}

/// Lazy sequence of parsed documents; see [`DocumentStore::list_documents`].
#[derive(Debug)]
pub struct DocumentIter {
    store: DocumentStore,
    pending: std::vec::IntoIter<PathBuf>,
}

impl Iterator for DocumentIter {
    type Item = Result<Document, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        for path in self.pending.by_ref() {
            match self.store.read_path(&path) {
                Ok(doc) => return Some(Ok(doc)),
                Err(err @ StoreError::InvalidDocument { .. }) => {
                    tracing::warn!(error = %err, "skipping invalid document");
                }
                // Removed between listing and reading.
                Err(StoreError::NotFound { .. }) => {}
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.{TMP_SUFFIX}", path.display()))
}
