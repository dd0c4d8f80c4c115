//! Content root and document path resolution.
//!
//! # Layout
//!
//! ```text
//! <content_root>/
//!   ru/hello.md
//!   en/hello.md    (mirror)
//!   uz/hello.md    (mirror)
//! ```
//!
//! The first segment under the root is the locale, the rest is the join key
//! shared by every document of a group. Every path is checked for
//! containment before any I/O is attempted. Containment is decided on the
//! real path: symlinked directories (and a symlinked document file) must
//! land inside the root too.

use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;
use crate::types::{Locale, LocaleSet};

/// A document location that has passed containment and locale checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    /// Absolute, normalized path.
    pub absolute: PathBuf,
    pub locale: Locale,
    /// Path below the locale directory; the cross-locale join key.
    pub relative: PathBuf,
}

impl DocumentPath {
    /// File stem of the document (`hello` for `ru/hello.md`).
    pub fn slug(&self) -> &str {
        self.relative
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    /// `ru/hello.md`, as used in log lines and reports.
    pub fn key(&self) -> String {
        Path::new(self.locale.as_str())
            .join(&self.relative)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// The configured content root together with the rules for what counts as
/// a document inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRoot {
    root: PathBuf,
    locales: LocaleSet,
    extension: String,
}

impl ContentRoot {
    /// `root` is made absolute and its existing part canonical so that
    /// watcher paths (which arrive as real paths) compare equal.
    pub fn new(root: impl Into<PathBuf>, locales: LocaleSet, extension: impl Into<String>) -> Self {
        let root = normalize(&absolutize(&root.into()));
        let root = real_dir(&root).unwrap_or(root);
        Self {
            root,
            locales,
            extension: extension.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn locales(&self) -> &LocaleSet {
        &self.locales
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `<root>/<locale>`
    pub fn locale_dir(&self, locale: &Locale) -> PathBuf {
        self.root.join(locale)
    }

    /// Whether `path` has the document extension. Temp files written by the
    /// store end in `.tmp` and never match.
    pub fn is_document_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    /// Resolve an arbitrary path (absolute or relative to the working
    /// directory) into a [`DocumentPath`].
    ///
    /// Check order: containment, document extension, locale segment.
    pub fn resolve(&self, path: &Path) -> Result<DocumentPath, StoreError> {
        let (absolute, relative) = self.strip_root(&normalize(&absolutize(path)))?;

        if !self.is_document_file(&absolute) {
            return Err(StoreError::NotADocument { path: absolute });
        }

        let mut components = relative.components();
        let locale = match components.next() {
            Some(Component::Normal(segment)) => segment.to_string_lossy().into_owned(),
            _ => return Err(StoreError::LocaleUnresolvable { path: absolute }),
        };
        let rest: PathBuf = components.collect();
        if rest.as_os_str().is_empty() || !self.locales.contains(&locale) {
            return Err(StoreError::LocaleUnresolvable { path: absolute });
        }

        Ok(DocumentPath {
            locale: Locale::from(locale),
            relative: rest,
            absolute,
        })
    }

    /// The path `source` maps to in `target`'s locale directory.
    pub fn mirror(&self, source: &DocumentPath, target: &Locale) -> Result<DocumentPath, StoreError> {
        let candidate = normalize(&self.root.join(target).join(&source.relative));
        let resolved = self.resolve(&candidate)?;
        if &resolved.locale != target || resolved.relative != source.relative {
            return Err(StoreError::PathEscape {
                path: candidate,
                root: self.root.clone(),
            });
        }
        Ok(resolved)
    }

    /// Path of `absolute` below the root, taken from its real location.
    fn strip_root(&self, absolute: &Path) -> Result<(PathBuf, PathBuf), StoreError> {
        let escape = || StoreError::PathEscape {
            path: absolute.to_path_buf(),
            root: self.root.clone(),
        };
        let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
            return Err(escape());
        };
        let real = real_dir(parent).ok_or_else(escape)?.join(name);

        let is_link = std::fs::symlink_metadata(&real)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            match std::fs::canonicalize(&real) {
                Ok(target) if target.starts_with(&self.root) => {}
                _ => return Err(escape()),
            }
        }

        let relative = real.strip_prefix(&self.root).map_err(|_| escape())?.to_path_buf();
        Ok((real, relative))
    }
}

/// Canonical form of the deepest existing ancestor of `dir`, with the
/// missing tail appended. `None` when an existing component is a link that
/// cannot be followed.
fn real_dir(dir: &Path) -> Option<PathBuf> {
    for ancestor in dir.ancestors() {
        match std::fs::canonicalize(ancestor) {
            Ok(canonical) => {
                let tail = dir.strip_prefix(ancestor).ok()?;
                return Some(canonical.join(tail));
            }
            // Dangling link.
            Err(_) if std::fs::symlink_metadata(ancestor).is_ok() => return None,
            Err(_) => {}
        }
    }
    None
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexical normalization: drops `.` and resolves `..` without touching the
/// filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
