//! Messages-API translation provider.
//!
//! `ureq` is blocking, so each request runs on the blocking pool. One
//! request per (document, target) pair; no retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use locsync_core::{LocaleSpec, TranslatorConfig};

use crate::error::{ProviderError, TranslateError};
use crate::prompt::PromptRenderer;
use crate::Translator;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Clone)]
pub struct AnthropicTranslator {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
    prompt: Arc<PromptRenderer>,
}

impl AnthropicTranslator {
    pub fn new(config: &TranslatorConfig, api_key: String) -> Result<Self, ProviderError> {
        let prompt = PromptRenderer::load(config.prompt_template.as_deref())?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Ok(Self {
            agent,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
            prompt: Arc::new(prompt),
        })
    }

    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &TranslatorConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    fn send(&self, prompt: &str, target: &str) -> Result<String, TranslateError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .agent
            .post(&self.endpoint)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", API_VERSION)
            .set("content-type", "application/json")
            .send_json(&request);

        match response {
            Ok(response) => {
                let body: MessagesResponse = response
                    .into_json()
                    .map_err(|e| TranslateError::Other(format!("unreadable response: {e}")))?;
                interpret_response(body, target, self.max_tokens)
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(TranslateError::Api {
                    status,
                    message: api_error_message(&body),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(TranslateError::Transport(transport.to_string()))
            }
        }
    }
}

#[async_trait]
impl Translator for AnthropicTranslator {
    async fn translate(
        &self,
        document: &str,
        source: &LocaleSpec,
        target: &LocaleSpec,
    ) -> Result<String, TranslateError> {
        let prompt = self.prompt.render(document, source, target)?;
        let this = self.clone();
        let target_code = target.code.to_string();

        tracing::debug!(
            source = %source.code,
            locale = %target.code,
            model = %self.model,
            "requesting translation"
        );

        tokio::task::spawn_blocking(move || this.send(&prompt, &target_code))
            .await
            .map_err(|e| TranslateError::Other(format!("translation task failed: {e}")))?
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

/// Turn a decoded response into document text. A `max_tokens` stop is a
/// hard failure even when some text came back.
pub(crate) fn interpret_response(
    response: MessagesResponse,
    target: &str,
    max_tokens: u32,
) -> Result<String, TranslateError> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        return Err(TranslateError::Truncated {
            target: target.to_string(),
            max_tokens,
        });
    }

    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.trim().is_empty() {
        return Err(TranslateError::Other("response contained no text".to_string()));
    }
    Ok(text)
}

/// `error.message` from an API error body, or the raw body.
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
