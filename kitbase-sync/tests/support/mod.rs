//! Shared test doubles for the sync engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kitbase_sync::{
    LocalStore, MemoryLocalStore, RemoteRecord, RemoteStore, StateSync, SyncConfig, SyncContext,
    SyncError, SyncResult,
};
use kitbase_types::{Identity, StaticIdentity};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

// ── Mock Remote ─────────────────────────────────────────────────

/// In-memory whole-blob remote with call counters and failure injection.
#[derive(Default)]
pub struct MockRemote {
    rows: Mutex<HashMap<String, Map<String, Value>>>,
    /// Delay applied to every read, to widen read-merge-write windows.
    read_delay: Option<Duration>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    pub reads: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_delay(delay: Duration) -> Self {
        Self {
            read_delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn seed(&self, identity: &Identity, data: Value) {
        let data = data.as_object().cloned().unwrap_or_default();
        self.rows.lock().await.insert(identity.id.clone(), data);
    }

    pub async fn blob(&self, identity: &Identity) -> Option<Map<String, Value>> {
        self.rows.lock().await.get(&identity.id).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn total_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
            + self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteSyncFailed("mock write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn get_record(&self, identity: &Identity) -> SyncResult<Option<RemoteRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteSyncFailed("mock read failure".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .await
            .get(&identity.id)
            .cloned()
            .map(RemoteRecord::new))
    }

    async fn create_record(
        &self,
        identity: &Identity,
        data: &Map<String, Value>,
    ) -> SyncResult<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.rows
            .lock()
            .await
            .insert(identity.id.clone(), data.clone());
        Ok(())
    }

    async fn update_record(
        &self,
        identity: &Identity,
        data: &Map<String, Value>,
    ) -> SyncResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.rows
            .lock()
            .await
            .insert(identity.id.clone(), data.clone());
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────

pub fn alice() -> Identity {
    Identity::new("9f1c2a7e-0000-4000-8000-000000000001", "alice@example.com")
}

pub fn signed_in_context(local: &MemoryLocalStore, remote: &Arc<MockRemote>) -> SyncContext {
    SyncContext {
        identity: Arc::new(StaticIdentity::signed_in(alice())),
        local: Arc::new(local.clone()),
        remote: Arc::clone(remote) as Arc<dyn RemoteStore>,
    }
}

pub fn anonymous_context(local: &MemoryLocalStore, remote: &Arc<MockRemote>) -> SyncContext {
    SyncContext {
        identity: Arc::new(StaticIdentity::anonymous()),
        local: Arc::new(local.clone()),
        remote: Arc::clone(remote) as Arc<dyn RemoteStore>,
    }
}

/// Routes engine logs to the test writer; set `RUST_LOG=kitbase_sync=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn engine(ctx: SyncContext) -> StateSync {
    init_tracing();
    StateSync::spawn(ctx, SyncConfig::default())
}

/// Stores `value` the way the engine would (JSON-encoded).
pub fn seed_local(local: &MemoryLocalStore, key: &str, value: Value) {
    local
        .set(key, &serde_json::to_string(&value).unwrap())
        .unwrap();
}
