//! Error types for locsync-translate.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single `translate` call. Recorded per target locale by the
/// dispatcher; sibling targets keep going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslateError {
    /// The provider stopped at its output limit. Partial output is discarded.
    #[error("translation to {target} truncated at max_tokens ({max_tokens})")]
    Truncated { target: String, max_tokens: u32 },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl TranslateError {
    /// Short machine-readable kind, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslateError::Truncated { .. } => "truncated",
            TranslateError::Transport(_) => "transport",
            TranslateError::Api { .. } => "api",
            TranslateError::Other(_) => "other",
        }
    }
}

/// Errors building a provider or its prompt.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
}

impl From<ProviderError> for TranslateError {
    fn from(err: ProviderError) -> Self {
        TranslateError::Other(err.to_string())
    }
}
