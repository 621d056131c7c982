//! Key-Value Storage
//!
//! The staging area is any string key-value store with prefix listing.
//! Browser session storage, a scratch directory and an in-memory map all fit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CheckoutError, Result};

/// Key-value storage trait for staged state
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value (no-op if absent)
    fn delete(&self, key: &str) -> Result<()>;

    /// List keys starting with `prefix`, sorted
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory key-value store (for development/testing)
pub struct MemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, String>>,
    /// Remaining successful writes before `set` starts failing
    write_budget: AtomicUsize,
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            write_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow `writes` more successful `set` calls, then fail like a full quota
    pub fn fail_writes_after(&self, writes: usize) {
        self.write_budget.store(writes, Ordering::SeqCst);
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let allowed = self
            .write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(CheckoutError::Storage(format!("quota exceeded writing {key}")));
        }

        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Directory-backed key-value store, one file per key.
///
/// File names are the hex-encoded key so any key is a safe file name.
/// Values are written to a temporary file and renamed into place.
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            // Skips leftover ".tmp" files and anything not written by this store
            let Ok(raw) = hex::decode(name) else { continue };
            let Ok(key) = String::from_utf8(raw) else { continue };

            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        store.set("checkout:file:1", "a").unwrap();
        store.set("checkout:file:2", "b").unwrap();
        store.set("other:key", "c").unwrap();

        assert_eq!(store.get("checkout:file:1").unwrap().as_deref(), Some("a"));
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(
            store.keys_with_prefix("checkout:").unwrap(),
            vec!["checkout:file:1".to_string(), "checkout:file:2".to_string()]
        );

        store.delete("checkout:file:1").unwrap();
        store.delete("checkout:file:1").unwrap();
        assert_eq!(store.get("checkout:file:1").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryKeyValueStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path()).unwrap();
        exercise(&store);

        // Survives reopening
        let reopened = FileKeyValueStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("checkout:file:2").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_write_budget() {
        let store = MemoryKeyValueStore::new();
        store.fail_writes_after(1);
        assert!(store.set("a", "1").is_ok());
        assert!(matches!(store.set("b", "2"), Err(CheckoutError::Storage(_))));
        assert_eq!(store.len(), 1);
    }
}
