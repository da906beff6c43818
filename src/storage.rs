//! Namespaced, versioned key-value store persisted as a single JSON file.
//!
//! Keys are stored as `<namespace>:v<version>:<key>`, so bumping the version abandons state
//! written by older builds instead of misreading it. The file is read once on open and
//! rewritten on every change.

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot read store {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot write store {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    namespace: String,
    version: u32,
    entries: Map<String, Value>,
}

impl LocalStore {
    /// Opens the store at `path`. A missing file is an empty store; an unparseable one is
    /// discarded with a warning.
    pub fn open(path: impl Into<PathBuf>, namespace: impl Into<String>, version: u32) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding unreadable store");
                    Map::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(source) => return Err(StorageError::Read { path, source }),
        };
        debug!(path = %path.display(), entries = entries.len(), "store opened");
        Ok(Self {
            path,
            namespace: namespace.into(),
            version,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The fully qualified key for `key` in this namespace and version.
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}:v{}:{}", self.namespace, self.version, key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&self.storage_key(key))
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.insert(self.storage_key(key), value);
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, StorageError> {
        let removed = self.entries.remove(&self.storage_key(key));
        if removed.is_some() {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Reads a list of strings. Anything stored under `key` that is not a list of strings is
    /// discarded and `default` returned instead.
    pub fn read_string_list(&self, key: &str, default: &[&str]) -> Vec<String> {
        let fallback = || default.iter().map(|s| s.to_string()).collect();
        let Some(value) = self.get(key) else {
            return fallback();
        };
        let parsed = value.as_array().and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        });
        match parsed {
            Some(list) => list,
            None => {
                warn!(key = %self.storage_key(key), "discarding malformed stored value");
                fallback()
            }
        }
    }

    pub fn write_string_list(&mut self, key: &str, values: &[String]) -> Result<(), StorageError> {
        let value = Value::Array(values.iter().cloned().map(Value::String).collect());
        self.set(key, value)
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, content).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &tempfile::TempDir) -> LocalStore {
        LocalStore::open(dir.path().join("store.json"), "query-builder", 1).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.get("anything").is_none());
        assert_eq!(store.read_string_list("dates", &["_exists_"]), vec!["_exists_"]);
    }

    #[test]
    fn test_key_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.storage_key("recent"), "query-builder:v1:recent");
    }

    #[test]
    fn test_write_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store
            .write_string_list("recent", &["a".to_string(), "b".to_string()])
            .unwrap();

        let reopened = store_in(&dir);
        assert_eq!(reopened.read_string_list("recent", &[]), vec!["a", "b"]);

        let raw: Value = serde_json::from_str(&fs::read_to_string(reopened.path()).unwrap()).unwrap();
        assert_eq!(raw["query-builder:v1:recent"], json!(["a", "b"]));
    }

    #[test]
    fn test_versions_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut v1 = LocalStore::open(&path, "query-builder", 1).unwrap();
        v1.write_string_list("recent", &["old".to_string()]).unwrap();

        let v2 = LocalStore::open(&path, "query-builder", 2).unwrap();
        assert_eq!(v2.read_string_list("recent", &["fresh"]), vec!["fresh"]);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("not-a-list", json!("text")).unwrap();
        store.set("mixed", json!(["a", 1])).unwrap();
        assert_eq!(store.read_string_list("not-a-list", &["x"]), vec!["x"]);
        assert!(store.read_string_list("mixed", &[]).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();
        let store = LocalStore::open(&path, "query-builder", 1).unwrap();
        assert!(store.get("recent").is_none());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("k", json!(["v"])).unwrap();
        assert_eq!(store.remove("k").unwrap(), Some(json!(["v"])));
        assert_eq!(store.remove("k").unwrap(), None);
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LocalStore::open(dir.path().join("nested/store.json"), "ns", 3).unwrap();
        store.write_string_list("k", &[]).unwrap();
        assert!(dir.path().join("nested/store.json").exists());
    }
}
