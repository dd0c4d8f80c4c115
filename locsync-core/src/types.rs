//! Domain types for the localized content tree.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::frontmatter::Frontmatter;
use crate::paths::DocumentPath;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A locale code such as `ru` or `en`. Doubles as the locale directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(pub String);

impl Locale {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Locale {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Locale {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<Path> for Locale {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Locale set
// ---------------------------------------------------------------------------

/// A configured locale: directory code plus the human language name handed
/// to the translation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleSpec {
    pub code: Locale,
    pub name: String,
}

impl LocaleSpec {
    pub fn new(code: impl Into<Locale>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Fixed, ordered, duplicate-free set of locales.
///
/// The order is the order targets are processed in; it carries no
/// correctness meaning beyond deterministic output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSet {
    specs: Vec<LocaleSpec>,
}

impl LocaleSet {
    /// Validate and build a locale set.
    pub fn new(specs: Vec<LocaleSpec>) -> Result<Self, ConfigError> {
        if specs.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "at least two locales are required, got {}",
                specs.len()
            )));
        }
        for (i, spec) in specs.iter().enumerate() {
            let code = spec.code.as_str();
            let valid = !code.is_empty()
                && code
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(ConfigError::Invalid(format!(
                    "locale code '{code}' must be a plain directory name"
                )));
            }
            if specs[..i].iter().any(|other| other.code == spec.code) {
                return Err(ConfigError::Invalid(format!("duplicate locale '{code}'")));
            }
        }
        Ok(Self { specs })
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocaleSpec> {
        self.specs.iter()
    }

    pub fn codes(&self) -> impl Iterator<Item = &Locale> {
        self.specs.iter().map(|spec| &spec.code)
    }

    pub fn get(&self, code: &str) -> Option<&LocaleSpec> {
        self.specs.iter().find(|spec| spec.code.as_str() == code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// Every locale except `source`, in configured order.
    pub fn others<'a>(&'a self, source: &'a Locale) -> impl Iterator<Item = &'a LocaleSpec> + 'a {
        self.specs.iter().filter(move |spec| &spec.code != source)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for LocaleSet {
    fn default() -> Self {
        Self {
            specs: default_locales(),
        }
    }
}

/// `ru`, `en`, `uz`.
pub fn default_locales() -> Vec<LocaleSpec> {
    vec![
        LocaleSpec::new("ru", "Russian"),
        LocaleSpec::new("en", "English"),
        LocaleSpec::new("uz", "Uzbek"),
    ]
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Synchronization state derived once from the header marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SyncState {
    /// `translated: true`: the document was produced by the engine.
    pub is_mirror: bool,
}

/// A parsed document at a resolved location inside the content root.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub location: DocumentPath,
    pub frontmatter: Frontmatter,
    pub state: SyncState,
    /// Filesystem modification time, when the document was read from disk.
    pub modified: Option<SystemTime>,
}

impl Document {
    pub fn new(location: DocumentPath, frontmatter: Frontmatter, modified: Option<SystemTime>) -> Self {
        let state = SyncState {
            is_mirror: frontmatter.header.is_translated(),
        };
        Self {
            location,
            frontmatter,
            state,
            modified,
        }
    }

    /// Parse document text that is not (yet) backed by a file.
    pub fn from_text(location: DocumentPath, text: &str) -> Result<Self, crate::FrontmatterError> {
        let frontmatter = Frontmatter::parse(text)?;
        Ok(Self::new(location, frontmatter, None))
    }

    pub fn locale(&self) -> &Locale {
        &self.location.locale
    }

    pub fn slug(&self) -> &str {
        self.location.slug()
    }

    pub fn body(&self) -> &str {
        &self.frontmatter.body
    }

    /// Full file text: delimiters, raw header, body.
    pub fn render(&self) -> String {
        self.frontmatter.render()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
