//! # locsync-translate
//!
//! The Translate collaborator: given a complete source document and a
//! (source, target) locale pair, produce a complete target document.
//!
//! - [`anthropic`]: messages-API provider over `ureq`
//! - [`passthrough`]: copies the source unchanged
//! - [`mock`]: scripted replies for tests
//! - [`prompt`]: tera prompt template
//!
//! The engine only ever sees `Arc<dyn Translator>`; [`from_config`] picks
//! the provider named in `locsync.yaml`.

pub mod anthropic;
pub mod error;
pub mod mock;
pub mod passthrough;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;

use locsync_core::{LocaleSpec, ProviderKind, TranslatorConfig};

pub use anthropic::AnthropicTranslator;
pub use error::{ProviderError, TranslateError};
pub use mock::{MockCall, MockReply, MockTranslator};
pub use passthrough::PassthroughTranslator;
pub use prompt::PromptRenderer;

/// A machine translation provider.
///
/// Output must be a complete replacement document, header delimiters
/// included, with `date`, `author` and `image` preserved verbatim.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        document: &str,
        source: &LocaleSpec,
        target: &LocaleSpec,
    ) -> Result<String, TranslateError>;

    /// Name used in log lines.
    fn provider_name(&self) -> &str;
}

/// Build the provider selected by `config.provider`.
pub fn from_config(config: &TranslatorConfig) -> Result<Arc<dyn Translator>, ProviderError> {
    let translator: Arc<dyn Translator> = match config.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicTranslator::from_config(config)?),
        ProviderKind::Passthrough => Arc::new(PassthroughTranslator),
    };
    tracing::debug!(provider = translator.provider_name(), "translator ready");
    Ok(translator)
}
