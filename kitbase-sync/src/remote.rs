//! Account-scoped remote store contract.
//!
//! The remote copy is a single row per identity holding the entire synced
//! mapping as one JSON object. There is no per-key API: writers read the
//! blob, merge, and write it back whole.

use crate::error::SyncResult;
use async_trait::async_trait;
use kitbase_types::Identity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The remote blob for one identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub data: Map<String, Value>,
}

impl RemoteRecord {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// Whole-blob remote key-value store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the record for `identity`, or `None` if no row exists yet.
    async fn get_record(&self, identity: &Identity) -> SyncResult<Option<RemoteRecord>>;

    /// Inserts the first record for `identity`.
    async fn create_record(&self, identity: &Identity, data: &Map<String, Value>)
    -> SyncResult<()>;

    /// Replaces the existing record for `identity` with `data`.
    async fn update_record(&self, identity: &Identity, data: &Map<String, Value>)
    -> SyncResult<()>;
}
