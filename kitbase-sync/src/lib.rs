//! Local-first key-value state sync for Kitbase.
//!
//! Keeps a device-local store and a per-user remote blob consistent:
//! - Remote-wins reconciliation on load
//! - Optimistic local writes with best-effort remote propagation
//! - Single-flight, ordered remote writer (no lost updates within a session)
//! - SQLite-backed local store and Supabase-backed remote store

pub mod config;
pub mod error;
pub mod local;
pub mod merge;
pub mod remote;
pub mod supabase;
pub mod sync_engine;

pub use config::{SupabaseConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use local::{LocalStore, MemoryLocalStore, SqliteLocalStore};
pub use remote::{RemoteRecord, RemoteStore};
pub use supabase::SupabaseStore;
pub use sync_engine::{
    RemoteWriter, StateSync, SyncContext, SyncOutcome, SyncStatus, create_state_sync,
};
