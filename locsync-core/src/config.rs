//! `locsync.yaml` configuration.
//!
//! Every field has a default; a missing file means "all defaults". Relative
//! paths (`content_root`, `state_dir`) are resolved against the directory
//! holding the config file.
//!
//! ```yaml
//! content_root: src/content/blog
//! extension: md
//! debounce_ms: 1000
//! locales:
//!   - { code: ru, name: Russian }
//!   - { code: en, name: English }
//!   - { code: uz, name: Uzbek }
//! translator:
//!   provider: anthropic
//!   max_tokens: 16384
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::ContentRoot;
use crate::types::{default_locales, LocaleSet, LocaleSpec};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "locsync.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub content_root: PathBuf,
    pub locales: Vec<LocaleSpec>,
    /// Document file extension, without the dot.
    pub extension: String,
    /// Write-stability threshold for the watcher.
    pub debounce_ms: u64,
    /// Runtime directory for the watch-mode control socket.
    pub state_dir: PathBuf,
    pub translator: TranslatorConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("src/content/blog"),
            locales: default_locales(),
            extension: "md".to_string(),
            debounce_ms: 1000,
            state_dir: PathBuf::from(".locsync"),
            translator: TranslatorConfig::default(),
        }
    }
}

/// Which Translate collaborator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Messages API over HTTPS.
    #[default]
    Anthropic,
    /// Returns the source document unchanged; seeds locales without an API.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub max_tokens: u32,
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Tera template replacing the built-in translation prompt.
    pub prompt_template: Option<PathBuf>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 16384,
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_secs: 300,
            prompt_template: None,
        }
    }
}

impl SyncConfig {
    /// Load the config at `path`, falling back to defaults when it does not
    /// exist. Relative paths are resolved against `path`'s directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_yaml::from_str::<SyncConfig>(&contents).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config not found, using defaults");
                SyncConfig::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config.content_root = base.join(&config.content_root);
        config.state_dir = base.join(&config.state_dir);
        if let Some(template) = config.translator.prompt_template.take() {
            config.translator.prompt_template = Some(base.join(template));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.locale_set()?;
        let ext = self.extension.as_str();
        if ext.is_empty() || ext.contains('.') || ext.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "extension '{ext}' must be a bare extension such as 'md'"
            )));
        }
        if self.translator.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "translator.max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn locale_set(&self) -> Result<LocaleSet, ConfigError> {
        LocaleSet::new(self.locales.clone())
    }

    pub fn content_root(&self) -> Result<ContentRoot, ConfigError> {
        Ok(ContentRoot::new(
            self.content_root.clone(),
            self.locale_set()?,
            self.extension.clone(),
        ))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
