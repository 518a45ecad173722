//! Durable key-value storage for the document.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::config::STORAGE_KEY;
use crate::document::Document;
use crate::error::{Error, Result};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// JSON object in a single file, rewritten on every `set`.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(unavailable(&self.path, e)),
        };
        serde_json::from_slice(&raw).map_err(|e| unavailable(&self.path, e))
    }
}

fn unavailable(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::StorageUnavailable(format!("{}: {reason}", path.display()))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(&entries).map_err(|e| unavailable(&self.path, e))?;
        std::fs::write(&self.path, json).map_err(|e| unavailable(&self.path, e))
    }
}

/// Non-durable store, for tests and for running without a data directory.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Saves and restores the document under the single fixed key.
pub struct Persistence {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl Persistence {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: STORAGE_KEY.to_string(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryStore>::default())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Overwrites whatever was saved before.
    pub fn save(&self, document: &Document) -> Result<()> {
        self.store.set(&self.key, document.markup())?;
        tracing::info!("saved document ({} bytes) under {}", document.markup().len(), self.key);
        Ok(())
    }

    /// `None` when nothing (or an empty document) was saved.
    pub fn load(&self) -> Result<Option<Document>> {
        Ok(self
            .store
            .get(&self.key)?
            .filter(|markup| !markup.is_empty())
            .map(Document::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let persistence = Persistence::in_memory();
        let doc = Document::new("<h1>タイトル</h1><p>本文 &amp; more</p>");

        persistence.save(&doc).unwrap();

        assert_eq!(persistence.load().unwrap(), Some(doc));
    }

    #[test]
    fn empty_store_loads_nothing() {
        assert_eq!(Persistence::in_memory().load().unwrap(), None);
    }

    #[test]
    fn empty_document_counts_as_absent() {
        let persistence = Persistence::in_memory();
        persistence.save(&Document::default()).unwrap();
        assert_eq!(persistence.load().unwrap(), None);
    }

    #[test]
    fn save_overwrites() {
        let persistence = Persistence::in_memory();
        persistence.save(&Document::new("old")).unwrap();
        persistence.save(&Document::new("new")).unwrap();
        assert_eq!(persistence.load().unwrap(), Some(Document::new("new")));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        Persistence::new(Box::new(FileStore::new(&path)))
            .save(&Document::new("<p>kept</p>"))
            .unwrap();

        let reopened = Persistence::new(Box::new(FileStore::new(&path)));
        assert_eq!(reopened.load().unwrap(), Some(Document::new("<p>kept</p>")));
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get(STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::new(&path).get(STORAGE_KEY).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[test]
    fn directory_in_place_of_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileStore::new(dir.path())
            .set(STORAGE_KEY, "x")
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }
}
