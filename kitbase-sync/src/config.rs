//! Sync configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Behavior of the state sync engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Key prefixes that are never loaded or synced (auth tokens, secrets).
    pub excluded_prefixes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec![
                "sb-".to_string(),
                "supabase.auth.".to_string(),
                "secret:".to_string(),
            ],
        }
    }
}

impl SyncConfig {
    /// Returns true if `key` may be loaded from local storage and synced.
    pub fn is_syncable(&self, key: &str) -> bool {
        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }
}

/// Connection settings for the Supabase-backed remote store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL (e.g., "https://abcd.supabase.co").
    pub url: String,

    /// Public anon key, sent as `apikey` on every request.
    pub anon_key: String,

    /// Table holding one settings row per user.
    pub table: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            table: "user_settings".to_string(),
            timeout_secs: 30,
        }
    }
}

impl SupabaseConfig {
    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY` from the environment.
    pub fn from_env() -> SyncResult<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| SyncError::Config("SUPABASE_URL is not set".to_string()))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| SyncError::Config("SUPABASE_ANON_KEY is not set".to_string()))?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            ..Self::default()
        })
    }
}
