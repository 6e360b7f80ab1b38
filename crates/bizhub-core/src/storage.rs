//! Key-value storage port.
//!
//! Client state that must outlive a single manager (visitor session ids)
//! goes through [`KeyValueStore`] instead of a global. Two backends:
//!
//! - [`MemoryStore`]: process-local map, for tests and ephemeral runs
//! - [`JsonFileStore`]: one JSON object on disk, rewritten on every mutation

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::StorageError;

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str);
    /// Delete `key`. Missing keys are ignored.
    fn remove(&self, key: &str);
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let _ = self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        let _ = self.entries.lock().remove(key);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JsonFileStore
// ─────────────────────────────────────────────────────────────────────────────

/// [`KeyValueStore`] persisted as a flat JSON object.
///
/// The whole file is loaded on open and rewritten after each `set`/`remove`.
/// Write failures are logged and the in-memory value is kept.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or invalid file
    /// also yields an empty store, with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_entries(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!(?path, "storage file not found, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to load storage file, starting empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) {
        if let Err(e) = save_entries(&self.path, entries) {
            warn!(path = ?self.path, error = %e, "failed to write storage file");
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock();
        let _ = entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

fn load_entries(path: &Path) -> Result<Option<BTreeMap<String, String>>, StorageError> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

fn save_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(path, json)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.set("k", "w");
        assert_eq!(store.get("k").as_deref(), Some("w"));
        assert_eq!(store.len(), 1);
        store.remove("k");
        assert!(store.get("k").is_none());
        store.remove("missing");
    }

    #[test]
    fn memory_store_as_trait_object() {
        let store: Box<dyn KeyValueStore> = Box::new(MemoryStore::new());
        store.set("a", "1");
        assert_eq!(store.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json"));
        assert!(store.get("anything").is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = JsonFileStore::open(&path);
        store.set("session", "abc");
        store.set("other", "x");
        store.remove("other");

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("session").as_deref(), Some("abc"));
        assert!(reopened.get("other").is_none());
    }

    #[test]
    fn file_store_invalid_json_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(store.get("session").is_none());

        store.set("session", "fresh");
        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("session").as_deref(), Some("fresh"));
    }
}
