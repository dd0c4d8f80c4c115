//! Translation prompt rendering.
//!
//! The built-in template is baked in with `include_str!`; a user template
//! file (`translator.prompt_template`) replaces it wholesale. Templates see:
//!
//! | variable           | value                                   |
//! |--------------------|-----------------------------------------|
//! | `source_name`      | language name of the source locale      |
//! | `target_name`      | language name of the target locale      |
//! | `source_code`      | source locale code                      |
//! | `target_code`      | target locale code                      |
//! | `translated_fields`| header keys the provider must translate |
//! | `preserved_fields` | header keys that must stay verbatim     |
//! | `marker`           | the mirror marker key                   |
//! | `document`         | complete source document text           |

use std::path::Path;

use tera::{Context, Tera};

use locsync_core::frontmatter::MARKER_KEY;
use locsync_core::LocaleSpec;

use crate::error::ProviderError;

const TEMPLATE_NAME: &str = "translate.md.tera";
const BUILTIN: &str = include_str!("templates/translate.md.tera");

/// Header keys whose values are language-bearing.
pub const TRANSLATED_FIELDS: &[&str] = &["title", "description", "tags"];

/// Header keys copied through unchanged.
pub const PRESERVED_FIELDS: &[&str] = &["date", "author", "image"];

#[derive(Debug)]
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    /// Renderer using the built-in template.
    pub fn new() -> Result<Self, ProviderError> {
        Self::from_source(BUILTIN)
    }

    /// Renderer using the template stored at `path`.
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let source = std::fs::read_to_string(path).map_err(|source| ProviderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(&source)
    }

    /// Built-in template unless `path` is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ProviderError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::new(),
        }
    }

    fn from_source(source: &str) -> Result<Self, ProviderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, source)?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        document: &str,
        source: &LocaleSpec,
        target: &LocaleSpec,
    ) -> Result<String, ProviderError> {
        let mut ctx = Context::new();
        ctx.insert("source_name", &source.name);
        ctx.insert("target_name", &target.name);
        ctx.insert("source_code", source.code.as_str());
        ctx.insert("target_code", target.code.as_str());
        ctx.insert("translated_fields", TRANSLATED_FIELDS);
        ctx.insert("preserved_fields", PRESERVED_FIELDS);
        ctx.insert("marker", MARKER_KEY);
        ctx.insert("document", document);
        Ok(self.tera.render(TEMPLATE_NAME, &ctx)?)
    }
}
