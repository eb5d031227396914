use rama::http::Uri;
use serde::Deserialize;

use crate::config::serde_url;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Fixed completion upstream all three chat variants forward to.
    #[serde(default = "default_chat_url", with = "serde_url")]
    pub url: Uri,
    /// Bearer token for the completion upstream. Falls back to the
    /// `EDGEWAY_CHAT_API_KEY` environment variable when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model ids served by the `/models` catalog endpoint.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    /// Outbound deadline for the timeout-extended variant, in seconds.
    #[serde(default = "default_extended_timeout_secs")]
    pub extended_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            api_key: None,
            models: default_models(),
            extended_timeout_secs: default_extended_timeout_secs(),
        }
    }
}

impl ChatConfig {
    pub(crate) fn resolve_api_key(&mut self) {
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            self.api_key = std::env::var("EDGEWAY_CHAT_API_KEY")
                .ok()
                .filter(|value| !value.is_empty());
        }
    }
}

fn default_chat_url() -> Uri {
    Uri::from_static("https://api.deepseek.com/chat/completions")
}

fn default_models() -> Vec<String> {
    vec!["deepseek-chat".to_string(), "deepseek-reasoner".to_string()]
}

fn default_extended_timeout_secs() -> u64 {
    300
}
