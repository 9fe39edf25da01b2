//! Chat configuration.

use serde::{Deserialize, Serialize};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";

/// Connection settings for one completion provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Server-side key; a per-request override takes precedence.
    pub api_key: Option<String>,

    pub base_url: String,

    /// TCP/TLS connect timeout in seconds. Streamed bodies are not bounded.
    pub connect_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: base_url.into(),
            connect_timeout_secs: 30,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn from_env(key_var: &str, url_var: &str, default_url: &str) -> Self {
        let base_url = std::env::var(url_var).unwrap_or_else(|_| default_url.to_string());
        Self {
            api_key: std::env::var(key_var).ok().filter(|k| !k.is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::new(default_url)
        }
    }
}

/// Configuration for the chat normalizer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Models callers may request. Anything else is rejected up front.
    pub allowed_models: Vec<String>,

    /// Feature name used for entitlement checks and metering.
    pub feature: String,

    /// `max_tokens` sent to providers that require it (Anthropic).
    pub max_tokens: u32,

    pub openai: ProviderConfig,

    pub anthropic: ProviderConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            allowed_models: vec![
                "gpt-4o".to_string(),
                "gpt-4o-mini".to_string(),
                "claude-3-5-sonnet-latest".to_string(),
                "claude-3-5-haiku-latest".to_string(),
            ],
            feature: "ai-chat".to_string(),
            max_tokens: 4096,
            openai: ProviderConfig::new(OPENAI_API_URL),
            anthropic: ProviderConfig::new(ANTHROPIC_API_URL),
        }
    }
}

impl ChatConfig {
    /// Defaults plus provider keys and base URLs from the environment
    /// (`OPENAI_API_KEY`, `OPENAI_BASE_URL`, `ANTHROPIC_API_KEY`,
    /// `ANTHROPIC_BASE_URL`).
    pub fn from_env() -> Self {
        Self {
            openai: ProviderConfig::from_env("OPENAI_API_KEY", "OPENAI_BASE_URL", OPENAI_API_URL),
            anthropic: ProviderConfig::from_env(
                "ANTHROPIC_API_KEY",
                "ANTHROPIC_BASE_URL",
                ANTHROPIC_API_URL,
            ),
            ..Self::default()
        }
    }

    pub fn is_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }
}
