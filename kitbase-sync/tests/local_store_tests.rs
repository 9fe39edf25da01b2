use kitbase_sync::{LocalStore, MemoryLocalStore, SqliteLocalStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn exercise(store: &dyn LocalStore) {
    assert_eq!(store.get("missing").unwrap(), None);

    store.set("b", "\"two\"").unwrap();
    store.set("a", "1").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

    store.set("a", "{\"x\":true}").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("{\"x\":true}"));

    store.remove("a").unwrap();
    assert_eq!(store.get("a").unwrap(), None);
    assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);

    // Removing an absent key is not an error.
    store.remove("a").unwrap();
}

#[test]
fn memory_store_basic_operations() {
    exercise(&MemoryLocalStore::new());
}

#[test]
fn memory_store_clones_share_entries() {
    let store = MemoryLocalStore::new();
    let clone = store.clone();
    store.set("k", "v").unwrap();
    assert_eq!(clone.get("k").unwrap().as_deref(), Some("v"));
}

#[test]
fn sqlite_in_memory_basic_operations() {
    exercise(&SqliteLocalStore::open_in_memory().unwrap());
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("state.db");

    {
        let store = SqliteLocalStore::open(&path).unwrap();
        store.set("theme", "\"dark\"").unwrap();
        store.set("sidebar", "{\"open\":false}").unwrap();
    }

    let reopened = SqliteLocalStore::open(&path).unwrap();
    assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("\"dark\""));
    assert_eq!(
        reopened.keys().unwrap(),
        vec!["sidebar".to_string(), "theme".to_string()]
    );
}
