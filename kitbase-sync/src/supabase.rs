//! Supabase client for the remote settings blob and the current user.
//!
//! Talks to PostgREST (`/rest/v1`) for the per-user row and to GoTrue
//! (`/auth/v1/user`) to resolve the signed-in identity. Uses reqwest with
//! JSON serialization.

use crate::config::SupabaseConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteRecord, RemoteStore};
use async_trait::async_trait;
use kitbase_types::{Identity, IdentityProvider};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Supabase-backed [`RemoteStore`] and [`IdentityProvider`].
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    config: SupabaseConfig,
    access_token: Arc<RwLock<Option<String>>>,
}

#[derive(Deserialize)]
struct SettingsRow {
    data: Map<String, Value>,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Sets the user access token (from a restored or fresh session).
    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
    }

    pub async fn clear_session(&self) {
        *self.access_token.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.config.table)
    }

    /// Adds `apikey` and bearer headers. Falls back to the anon key when no
    /// user session is set, which row-level security will reject.
    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.config.anon_key.clone());
        builder
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn check(resp: reqwest::Response, op: &str) -> SyncResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::RemoteSyncFailed(format!("{op} returned {status}: {body}")))
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn get_record(&self, identity: &Identity) -> SyncResult<Option<RemoteRecord>> {
        let req = self
            .client
            .get(self.rest_url())
            .query(&[
                ("user_id", format!("eq.{}", identity.id)),
                ("select", "data".to_string()),
            ]);
        let resp = self.authorize(req).await.send().await?;
        let resp = Self::check(resp, "get_record").await?;

        let mut rows: Vec<SettingsRow> = resp.json().await?;
        if rows.len() > 1 {
            warn!("{} settings rows for user {}, using the first", rows.len(), identity.id);
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(RemoteRecord::new(rows.swap_remove(0).data)))
    }

    async fn create_record(
        &self,
        identity: &Identity,
        data: &Map<String, Value>,
    ) -> SyncResult<()> {
        let req = self
            .client
            .post(self.rest_url())
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "user_id": identity.id, "data": data }));
        let resp = self.authorize(req).await.send().await?;
        Self::check(resp, "create_record").await?;
        debug!("created settings row for user {}", identity.id);
        Ok(())
    }

    async fn update_record(
        &self,
        identity: &Identity,
        data: &Map<String, Value>,
    ) -> SyncResult<()> {
        let req = self
            .client
            .patch(self.rest_url())
            .query(&[("user_id", format!("eq.{}", identity.id))])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "data": data }));
        let resp = self.authorize(req).await.send().await?;
        Self::check(resp, "update_record").await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for SupabaseStore {
    async fn current_user(&self) -> Option<Identity> {
        let token = self.access_token.read().await.clone()?;
        let url = format!("{}/auth/v1/user", self.config.url);

        let resp = match self
            .client
            .get(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("failed to resolve current user: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!("current user lookup returned {}", resp.status());
            return None;
        }

        match resp.json::<AuthUser>().await {
            Ok(user) => Some(Identity::new(user.id, user.email.unwrap_or_default())),
            Err(e) => {
                warn!("malformed auth user response: {e}");
                None
            }
        }
    }
}
