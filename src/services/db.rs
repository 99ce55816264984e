//! Nested-key JSON document store
//!
//! A single JSON object on disk, addressed by dotted keys
//! (`"explorer.actionMru"` → `{"explorer": {"actionMru": ...}}`).
//! A missing directory, missing file or malformed document reads as `{}`.
//!
//! Writes are atomic: the document is written to a temporary file in the same
//! directory, synced, then renamed over the original. Writers are serialised
//! through an internal lock so read-modify-write cycles in one process never
//! interleave.

use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors from the on-disk store
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A dotted key walks through a value that is not an object
    #[error("'{key}' does not address an object in {path}")]
    NotAnObject { key: String, path: PathBuf },
}

/// JSON document addressed by dotted keys
pub struct JsonDb {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDb {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document
    pub async fn load(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read {:?}: {}", self.path, e);
                }
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(content.trim()) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!("Ignoring {:?}: top-level value is not an object", self.path);
                Map::new()
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed {:?}: {}", self.path, e);
                Map::new()
            }
        }
    }

    /// Value at a dotted key; an empty key returns the whole document
    pub async fn fetch(&self, key: &str) -> Option<Value> {
        let doc = Value::Object(self.load().await);
        if key.is_empty() {
            return Some(doc);
        }
        lookup(&doc, key).cloned()
    }

    pub async fn exists(&self, key: &str) -> bool {
        let doc = Value::Object(self.load().await);
        lookup(&doc, key).is_some()
    }

    /// Store `data` at a dotted key, creating intermediate objects
    pub async fn push(&self, key: &str, data: Value) -> Result<(), PersistenceError> {
        let _writer = self.write_lock.lock().await;
        let mut doc = self.load().await;

        let parts: Vec<&str> = key.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return Ok(());
        };

        let mut obj = &mut doc;
        for part in parents {
            let entry = obj
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            obj = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(PersistenceError::NotAnObject {
                        key: key.to_string(),
                        path: self.path.clone(),
                    })
                }
            };
        }
        obj.insert(last.to_string(), data);

        self.write(&doc).await
    }

    /// Remove the value at a dotted key; missing keys are a no-op
    pub async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let _writer = self.write_lock.lock().await;
        let mut doc = self.load().await;

        let parts: Vec<&str> = key.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return Ok(());
        };

        let mut obj = &mut doc;
        for part in parents {
            match obj.get_mut(*part) {
                Some(Value::Object(map)) => obj = map,
                _ => return Ok(()),
            }
        }
        if obj.remove(*last).is_none() {
            return Ok(());
        }

        self.write(&doc).await
    }

    /// Reset an existing document to `{}`
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        let _writer = self.write_lock.lock().await;
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => self.write(&Map::new()).await,
            _ => Ok(()),
        }
    }

    async fn write(&self, doc: &Map<String, Value>) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content =
            serde_json::to_string_pretty(doc).map_err(|source| PersistenceError::Json {
                path: self.path.clone(),
                source,
            })?;

        // Write atomically: temp file + rename
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path).await.map_err(io_err)?;
            file.write_all(content.as_bytes()).await.map_err(io_err)?;
            file.sync_all().await.map_err(io_err)?;
        }
        fs::rename(&temp_path, &self.path).await.map_err(io_err)?;

        tracing::trace!("Wrote {} bytes to {:?}", content.len(), self.path);
        Ok(())
    }
}

fn lookup<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(doc, |value, part| value.get(part))
}
