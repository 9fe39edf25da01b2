//! Value decoding and remote-wins reconciliation.

use crate::config::SyncConfig;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Decodes a locally stored string. Values that are not valid JSON were
/// written raw by older clients and are kept as plain strings.
pub fn decode_local(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Applies every syncable remote entry that is absent or different locally.
/// Values compare structurally, so object key order never counts as a change.
///
/// Returns the overwritten keys in ascending order; callers persist exactly
/// these back to local storage.
pub fn merge_remote(
    local: &mut BTreeMap<String, Value>,
    remote: &Map<String, Value>,
    config: &SyncConfig,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, remote_value) in remote {
        if !config.is_syncable(key) {
            continue;
        }
        if local.get(key) != Some(remote_value) {
            local.insert(key.clone(), remote_value.clone());
            changed.push(key.clone());
        }
    }
    changed.sort();
    changed
}
