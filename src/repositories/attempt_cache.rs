use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{Assignment, Attempt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    Pending,
    Completed,
}

impl CacheSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheSlot::Pending => "pending",
            CacheSlot::Completed => "completed",
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable string slots namespaced by student id.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, namespace: &str, slot: CacheSlot) -> Result<Option<String>, CacheError>;
    fn write(&self, namespace: &str, slot: CacheSlot, value: &str) -> Result<(), CacheError>;
}

/// One directory per student (hashed id), one JSON document per slot.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn slot_path(&self, namespace: &str, slot: CacheSlot) -> PathBuf {
        let digest = Sha256::digest(namespace.as_bytes());
        self.root.join(hex::encode(digest)).join(format!("{}.json", slot.as_str()))
    }
}

fn io_error(path: &Path, source: io::Error) -> CacheError {
    CacheError::Io { path: path.to_path_buf(), source }
}

impl KeyValueStore for FileStore {
    fn read(&self, namespace: &str, slot: CacheSlot) -> Result<Option<String>, CacheError> {
        let path = self.slot_path(namespace, slot);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path, err)),
        }
    }

    fn write(&self, namespace: &str, slot: CacheSlot, value: &str) -> Result<(), CacheError> {
        let path = self.slot_path(namespace, slot);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
        }

        // Staged write, then rename over the live document.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).map_err(|err| io_error(&staging, err))?;
        fs::rename(&staging, &path).map_err(|err| io_error(&path, err))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(String, CacheSlot), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, namespace: &str, slot: CacheSlot) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(&(namespace.to_string(), slot)).cloned())
    }

    fn write(&self, namespace: &str, slot: CacheSlot, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert((namespace.to_string(), slot), value.to_string());
        Ok(())
    }
}

/// Per-student pending and completed collections. Every write replaces the whole
/// collection; callers own read-modify-write ordering.
#[derive(Clone)]
pub struct AttemptCache {
    store: Arc<dyn KeyValueStore>,
}

impl AttemptCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn load_pending(&self, student_id: &str) -> Vec<Assignment> {
        self.load(student_id, CacheSlot::Pending)
    }

    pub fn save_pending(&self, student_id: &str, pending: &[Assignment]) -> Result<(), CacheError> {
        self.save(student_id, CacheSlot::Pending, pending)
    }

    pub fn load_completed(&self, student_id: &str) -> Vec<Attempt> {
        self.load(student_id, CacheSlot::Completed)
    }

    pub fn save_completed(&self, student_id: &str, completed: &[Attempt]) -> Result<(), CacheError> {
        self.save(student_id, CacheSlot::Completed, completed)
    }

    fn load<T: DeserializeOwned>(&self, student_id: &str, slot: CacheSlot) -> Vec<T> {
        let raw = match self.store.read(student_id, slot) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(student_id, slot = slot.as_str(), error = %err, "Cache read failed");
                return Vec::new();
            }
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    student_id,
                    slot = slot.as_str(),
                    error = %err,
                    "Discarding unreadable cache entry"
                );
                return Vec::new();
            }
        };

        // Records decode one at a time; unreadable ones are skipped.
        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(item) => Some(item),
                Err(err) => {
                    tracing::warn!(
                        student_id,
                        slot = slot.as_str(),
                        index,
                        error = %err,
                        "Skipping unreadable cached record"
                    );
                    None
                }
            })
            .collect()
    }

    fn save<T: Serialize>(&self, student_id: &str, slot: CacheSlot, items: &[T]) -> Result<(), CacheError> {
        let raw = serde_json::to_string(items)?;
        self.store.write(student_id, slot, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures;

    #[test]
    fn absent_student_yields_empty_collections() {
        let cache = AttemptCache::in_memory();
        assert!(cache.load_pending("nobody").is_empty());
        assert!(cache.load_completed("nobody").is_empty());
    }

    #[test]
    fn saves_replace_whole_collection_and_keep_order() {
        let cache = AttemptCache::in_memory();
        let first = vec![fixtures::assignment("1", 1, 1), fixtures::assignment("2", 1, 1)];
        cache.save_pending("s1", &first).unwrap();

        let second = vec![fixtures::assignment("3", 1, 1)];
        cache.save_pending("s1", &second).unwrap();
        assert_eq!(cache.load_pending("s1"), second);

        let attempts = vec![fixtures::temporary_attempt("s1", "1"), fixtures::server_attempt("s1", "9", "2")];
        cache.save_completed("s1", &attempts).unwrap();
        assert_eq!(cache.load_completed("s1"), attempts);
    }

    #[test]
    fn students_are_isolated() {
        let cache = AttemptCache::in_memory();
        cache.save_pending("s1", &[fixtures::assignment("1", 1, 1)]).unwrap();
        assert!(cache.load_pending("s2").is_empty());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = vec![fixtures::temporary_attempt("../escape", "1")];

        AttemptCache::new(Arc::new(FileStore::new(dir.path())))
            .save_completed("../escape", &attempts)
            .unwrap();

        let reopened = AttemptCache::new(Arc::new(FileStore::new(dir.path())));
        assert_eq!(reopened.load_completed("../escape"), attempts);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn unreadable_record_does_not_hide_its_neighbours() {
        let store = Arc::new(MemoryStore::new());
        let kept = fixtures::temporary_attempt("s1", "a1");
        let raw = serde_json::json!([kept, {"id": "temp-legacy", "score": 1}]).to_string();
        store.write("s1", CacheSlot::Completed, &raw).unwrap();

        let cache = AttemptCache::new(store);
        assert_eq!(cache.load_completed("s1"), vec![kept]);
    }

    #[test]
    fn corrupt_entry_reads_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.write("s1", CacheSlot::Completed, "{not json").unwrap();

        let cache = AttemptCache::new(store);
        assert!(cache.load_completed("s1").is_empty());
    }
}
