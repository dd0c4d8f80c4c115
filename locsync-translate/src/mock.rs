//! Deterministic, API-free translator for tests.
//!
//! ```ignore
//! let mock = MockTranslator::echo()
//!     .with_reply("uz", MockReply::Fail(TranslateError::Transport("reset".into())));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use locsync_core::LocaleSpec;

use crate::error::TranslateError;
use crate::Translator;

/// What the mock answers for a target locale.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// The input document followed by a `[<target>]` line.
    Echo,
    /// Fixed output text.
    Text(String),
    Fail(TranslateError),
}

/// One recorded `translate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub source: String,
    pub target: String,
    pub document: String,
}

#[derive(Debug, Clone)]
pub struct MockTranslator {
    default: MockReply,
    per_target: HashMap<String, MockReply>,
    delay: Duration,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockTranslator {
    pub fn new(default: MockReply) -> Self {
        Self {
            default,
            per_target: HashMap::new(),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn echo() -> Self {
        Self::new(MockReply::Echo)
    }

    /// Override the reply for one target locale code.
    pub fn with_reply(mut self, target: &str, reply: MockReply) -> Self {
        self.per_target.insert(target.to_string(), reply);
        self
    }

    /// Sleep before answering, to keep a batch in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls so far, in order. Clones share the log.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Target codes of the calls so far, in order.
    pub fn targets(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.target).collect()
    }
}

/// `document` with a `[<target>]` line appended.
pub fn echo_text(document: &str, target: &str) -> String {
    let mut out = document.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("[{target}]\n"));
    out
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        document: &str,
        source: &LocaleSpec,
        target: &LocaleSpec,
    ) -> Result<String, TranslateError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(MockCall {
                source: source.code.to_string(),
                target: target.code.to_string(),
                document: document.to_string(),
            });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self
            .per_target
            .get(target.code.as_str())
            .unwrap_or(&self.default);
        match reply {
            MockReply::Echo => Ok(echo_text(document, target.code.as_str())),
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Fail(err) => Err(err.clone()),
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
