//! Provider that returns the source document unchanged.
//!
//! Seeds every locale with a copy of the source so that document groups are
//! complete before real translations exist. The dispatcher still stamps the
//! marker, so the copies are mirrors and are replaced on the next edit.

use async_trait::async_trait;

use locsync_core::LocaleSpec;

use crate::error::TranslateError;
use crate::Translator;

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(
        &self,
        document: &str,
        _source: &LocaleSpec,
        _target: &LocaleSpec,
    ) -> Result<String, TranslateError> {
        Ok(document.to_string())
    }

    fn provider_name(&self) -> &str {
        "passthrough"
    }
}
