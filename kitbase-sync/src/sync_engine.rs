//! Local-first state sync engine.
//!
//! Presents one key-value mapping backed by a device-local store and a
//! per-identity remote blob:
//! - `load` reconciles once per session (remote wins on differing keys)
//! - `update`/`clear` write locally first, then queue a remote write
//! - a single [`RemoteWriter`] task applies queued writes one at a time, in
//!   submission order, re-reading the remote blob before every merge
//!
//! Remote failures never roll back local state; they flip the status to
//! [`SyncStatus::OutOfSync`] until the next successful write or `load`.
//! Writes from a second session for the same identity (another tab or
//! device) are not coordinated; the later whole-blob write wins.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::merge::{decode_local, merge_remote};
use crate::remote::RemoteStore;

use kitbase_types::{Identity, IdentityProvider};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Collaborators the engine works against.
#[derive(Clone)]
pub struct SyncContext {
    pub identity: Arc<dyn IdentityProvider>,
    pub local: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteStore>,
}

/// Overall remote sync state, observable through [`StateSync::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No remote reconciliation has happened (or no identity is available).
    Idle,
    /// At least one remote write is queued or in flight.
    Syncing,
    Synced,
    OutOfSync,
}

/// Result of the remote half of a single mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    /// Remote write failed; the local value stands.
    OutOfSync,
    /// Nothing was sent: no identity, or the key is never synced.
    LocalOnly,
}

#[derive(Debug, Clone)]
enum Mutation {
    Set { key: String, value: Value },
    Remove { key: String },
}

impl Mutation {
    fn key(&self) -> &str {
        match self {
            Mutation::Set { key, .. } | Mutation::Remove { key } => key,
        }
    }
}

enum RemoteOp {
    Mutate {
        mutation: Mutation,
        ack: oneshot::Sender<SyncOutcome>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// In-memory mapping plus a per-key record of when each key was last
/// written, so a `load` never overwrites a write made while it was waiting
/// on the remote.
#[derive(Default)]
struct SyncState {
    values: BTreeMap<String, Value>,
    epoch: u64,
    touched: HashMap<String, u64>,
}

impl SyncState {
    fn touch(&mut self, key: &str) {
        self.epoch += 1;
        self.touched.insert(key.to_string(), self.epoch);
    }

    fn touched_since(&self, key: &str, epoch: u64) -> bool {
        self.touched.get(key).is_some_and(|&at| at > epoch)
    }
}

/// Application-facing handle to the synced mapping.
pub struct StateSync {
    ctx: SyncContext,
    config: SyncConfig,
    state: RwLock<SyncState>,
    queue_tx: mpsc::UnboundedSender<RemoteOp>,
    status_tx: Arc<watch::Sender<SyncStatus>>,
    pending: Arc<AtomicUsize>,
}

/// Drains the remote write queue. Exactly one per [`StateSync`].
pub struct RemoteWriter {
    ctx: SyncContext,
    queue_rx: mpsc::UnboundedReceiver<RemoteOp>,
    status_tx: Arc<watch::Sender<SyncStatus>>,
    pending: Arc<AtomicUsize>,
    batch_synced: bool,
    batch_failed: bool,
}

/// Creates a state sync handle and the writer that must be driven with
/// [`RemoteWriter::run`] for remote writes to make progress.
pub fn create_state_sync(ctx: SyncContext, config: SyncConfig) -> (StateSync, RemoteWriter) {
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let (status_tx, _) = watch::channel(SyncStatus::Idle);
    let status_tx = Arc::new(status_tx);
    let pending = Arc::new(AtomicUsize::new(0));

    let writer = RemoteWriter {
        ctx: ctx.clone(),
        queue_rx,
        status_tx: Arc::clone(&status_tx),
        pending: Arc::clone(&pending),
        batch_synced: false,
        batch_failed: false,
    };

    let sync = StateSync {
        ctx,
        config,
        state: RwLock::new(SyncState::default()),
        queue_tx,
        status_tx,
        pending,
    };

    (sync, writer)
}

impl StateSync {
    /// Creates the engine and spawns its writer on the current tokio runtime.
    pub fn spawn(ctx: SyncContext, config: SyncConfig) -> Self {
        let (sync, writer) = create_state_sync(ctx, config);
        tokio::spawn(writer.run());
        sync
    }

    /// Reads local state, reconciles it against the remote blob when an
    /// identity is available, and returns the merged mapping.
    ///
    /// Keys written through `update`/`clear` while the remote read is in
    /// flight keep their new value; remote wins only for keys untouched
    /// since the local read.
    pub async fn load(&self) -> SyncResult<BTreeMap<String, Value>> {
        let (mut merged, epoch) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (self.read_local()?, state.epoch)
        };

        let mut changed = Vec::new();
        let settled = match self.ctx.identity.current_user().await {
            None => {
                debug!("no identity, loading local state only");
                SyncStatus::Idle
            }
            Some(identity) => match self.ctx.remote.get_record(&identity).await {
                Ok(Some(record)) => {
                    changed = merge_remote(&mut merged, &record.data, &self.config);
                    info!(
                        "reconciled state for user {}: {} keys taken from remote",
                        identity.id,
                        changed.len()
                    );
                    SyncStatus::Synced
                }
                Ok(None) => {
                    debug!("no remote record for user {} yet", identity.id);
                    SyncStatus::Synced
                }
                Err(e) => {
                    warn!("remote fetch failed, using local state: {e}");
                    SyncStatus::OutOfSync
                }
            },
        };

        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            for key in &changed {
                if state.touched_since(key, epoch) {
                    debug!("keeping {key} written during load");
                    continue;
                }
                if let Some(value) = merged.get(key) {
                    self.ctx.local.set(key, &serde_json::to_string(value)?)?;
                }
            }

            let mut values: BTreeMap<String, Value> = merged
                .into_iter()
                .filter(|(key, _)| !state.touched_since(key, epoch))
                .collect();
            for (key, _) in state.touched.iter().filter(|&(_, &at)| at > epoch) {
                if let Some(value) = state.values.get(key) {
                    values.insert(key.clone(), value.clone());
                }
            }
            state.values = values;
            state.values.clone()
        };

        self.settle_if_idle(settled);
        Ok(snapshot)
    }

    /// Sets `key` locally, then syncs it to the remote blob.
    ///
    /// Resolves once this write's remote half has finished. Local state is
    /// updated even when the remote half fails.
    pub async fn update(&self, key: &str, value: Value) -> SyncResult<SyncOutcome> {
        let encoded = serde_json::to_string(&value)?;
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            self.ctx.local.set(key, &encoded)?;
            state.values.insert(key.to_string(), value.clone());
            state.touch(key);
        }

        if !self.config.is_syncable(key) {
            return Ok(SyncOutcome::LocalOnly);
        }
        self.submit(Mutation::Set {
            key: key.to_string(),
            value,
        })
        .await
    }

    /// Removes `key` locally, then from the remote blob if present.
    pub async fn clear(&self, key: &str) -> SyncResult<SyncOutcome> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            self.ctx.local.remove(key)?;
            state.values.remove(key);
            state.touch(key);
        }

        if !self.config.is_syncable(key) {
            return Ok(SyncOutcome::LocalOnly);
        }
        self.submit(Mutation::Remove {
            key: key.to_string(),
        })
        .await
    }

    /// Waits until every remote write queued before this call has finished.
    pub async fn flush(&self) -> SyncResult<()> {
        let (ack, done) = oneshot::channel();
        self.queue_tx
            .send(RemoteOp::Flush { ack })
            .map_err(|_| SyncError::EngineStopped)?;
        done.await.map_err(|_| SyncError::EngineStopped)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .clone()
    }

    pub fn status(&self) -> SyncStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    fn read_local(&self) -> SyncResult<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for key in self.ctx.local.keys()? {
            if !self.config.is_syncable(&key) {
                continue;
            }
            if let Some(raw) = self.ctx.local.get(&key)? {
                values.insert(key, decode_local(&raw));
            }
        }
        Ok(values)
    }

    async fn submit(&self, mutation: Mutation) -> SyncResult<SyncOutcome> {
        let (ack, done) = oneshot::channel();
        self.status_tx.send_modify(|status| {
            self.pending.fetch_add(1, Ordering::SeqCst);
            *status = SyncStatus::Syncing;
        });
        if self
            .queue_tx
            .send(RemoteOp::Mutate { mutation, ack })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::EngineStopped);
        }
        done.await.map_err(|_| SyncError::EngineStopped)
    }

    /// Publishes a load result unless writes are still in flight.
    fn settle_if_idle(&self, status: SyncStatus) {
        self.status_tx.send_if_modified(|current| {
            if self.pending.load(Ordering::SeqCst) > 0 || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

impl RemoteWriter {
    /// Runs until every [`StateSync`] handle feeding this writer is dropped.
    pub async fn run(mut self) {
        debug!("remote writer started");

        while let Some(op) = self.queue_rx.recv().await {
            match op {
                RemoteOp::Mutate { mutation, ack } => {
                    let outcome = self.apply(&mutation).await;
                    self.settle(outcome);
                    // The caller may have stopped waiting; the write still counts.
                    let _ = ack.send(outcome);
                }
                RemoteOp::Flush { ack } => {
                    let _ = ack.send(());
                }
            }
        }

        debug!("remote writer stopped");
    }

    async fn apply(&self, mutation: &Mutation) -> SyncOutcome {
        let Some(identity) = self.ctx.identity.current_user().await else {
            debug!("no identity, keeping {} local only", mutation.key());
            return SyncOutcome::LocalOnly;
        };

        match self.write_through(&identity, mutation).await {
            Ok(()) => {
                debug!("synced key {} for user {}", mutation.key(), identity.id);
                SyncOutcome::Synced
            }
            Err(e) => {
                warn!("remote sync failed for key {}: {e}", mutation.key());
                SyncOutcome::OutOfSync
            }
        }
    }

    /// Read-merge-write against a fresh copy of the remote blob.
    async fn write_through(&self, identity: &Identity, mutation: &Mutation) -> SyncResult<()> {
        let remote = &self.ctx.remote;
        let existing = remote.get_record(identity).await?;

        match (existing, mutation) {
            (None, Mutation::Set { key, value }) => {
                let mut data = Map::new();
                data.insert(key.clone(), value.clone());
                remote.create_record(identity, &data).await
            }
            (None, Mutation::Remove { .. }) => Ok(()),
            (Some(mut record), Mutation::Set { key, value }) => {
                record.data.insert(key.clone(), value.clone());
                remote.update_record(identity, &record.data).await
            }
            (Some(mut record), Mutation::Remove { key }) => {
                if record.data.remove(key).is_none() {
                    return Ok(());
                }
                remote.update_record(identity, &record.data).await
            }
        }
    }

    fn settle(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Synced => self.batch_synced = true,
            SyncOutcome::OutOfSync => self.batch_failed = true,
            SyncOutcome::LocalOnly => {}
        }

        self.pending.fetch_sub(1, Ordering::SeqCst);
        let next = if self.batch_failed {
            SyncStatus::OutOfSync
        } else if self.batch_synced {
            SyncStatus::Synced
        } else {
            SyncStatus::Idle
        };

        let drained = self.status_tx.send_if_modified(|status| {
            if self.pending.load(Ordering::SeqCst) > 0 {
                return false;
            }
            *status = next;
            true
        });
        if drained {
            self.batch_synced = false;
            self.batch_failed = false;
        }
    }
}
