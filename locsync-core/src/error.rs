//! Error types for locsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Why a file is not a valid document.
#[derive(Debug, Error)]
pub enum FrontmatterError {
    #[error("missing opening `---` delimiter")]
    MissingOpeningDelimiter,

    #[error("missing closing `---` delimiter")]
    MissingClosingDelimiter,

    #[error("header is not a key/value mapping")]
    NotAMapping,

    #[error("header YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document is not valid UTF-8")]
    NotUtf8,
}

/// All errors that can arise from path resolution and document store access.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed header block.
    #[error("invalid document at {path}: {source}")]
    InvalidDocument {
        path: PathBuf,
        #[source]
        source: FrontmatterError,
    },

    /// The path does not sit inside a configured locale directory.
    #[error("no configured locale for {path}")]
    LocaleUnresolvable { path: PathBuf },

    /// The file does not have the document extension.
    #[error("not a document file: {path}")]
    NotADocument { path: PathBuf },

    /// A source or computed target path resolves outside the content root.
    #[error("path {path} escapes content root {root}")]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("document not found: {path}")]
    NotFound { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Short machine-readable kind, used in reports and status JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::InvalidDocument { .. } => "invalid_document",
            StoreError::LocaleUnresolvable { .. } => "locale_unresolvable",
            StoreError::NotADocument { .. } => "not_a_document",
            StoreError::PathEscape { .. } => "path_escape",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Io { .. } => "io",
        }
    }
}

/// Errors loading or validating `locsync.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; carries serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
