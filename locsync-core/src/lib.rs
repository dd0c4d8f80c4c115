//! locsync core library: domain types, document store, frontmatter marker,
//! configuration, errors.
//!
//! - [`types`]: locales, documents, sync state
//! - [`paths`]: content root containment and locale resolution
//! - [`frontmatter`]: header parsing and the `translated` marker
//! - [`store`]: read / write / list / delete documents
//! - [`config`]: `locsync.yaml`
//! - [`error`]: [`StoreError`], [`ConfigError`], [`FrontmatterError`]

pub mod config;
pub mod error;
pub mod frontmatter;
pub mod paths;
pub mod store;
pub mod types;

pub use config::{ProviderKind, SyncConfig, TranslatorConfig, CONFIG_FILE};
pub use error::{ConfigError, FrontmatterError, StoreError};
pub use frontmatter::{is_translated, stamp_translated, Frontmatter, Header};
pub use paths::{ContentRoot, DocumentPath};
pub use store::{DocumentIter, DocumentStore, TargetState};
pub use types::{Document, Locale, LocaleSet, LocaleSpec, SyncState};
