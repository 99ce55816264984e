//! Most-recently-used action identifiers
//!
//! The list is kept most recent first: index 0 is the identifier that was
//! dispatched last. Recording an identifier moves it to the front and drops
//! anything beyond the capacity.

use crate::services::db::{JsonDb, PersistenceError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Persisted recency list
#[async_trait]
pub trait RecencyStore: Send + Sync {
    async fn load(&self) -> Result<Vec<String>, PersistenceError>;

    async fn save(&self, list: &[String]) -> Result<(), PersistenceError>;

    /// Move `identifier` to the front of the list and persist it
    async fn record(&self, identifier: &str) -> Result<(), PersistenceError>;

    /// Like `load`, but a failing store reads as empty
    async fn load_or_empty(&self) -> Vec<String> {
        match self.load().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Failed to load action history, using empty list: {}", e);
                Vec::new()
            }
        }
    }
}

/// Move `identifier` to the front of `list`, keeping at most `cap` entries
pub fn promote(list: &mut Vec<String>, identifier: &str, cap: usize) {
    list.retain(|existing| existing != identifier);
    list.insert(0, identifier.to_string());
    list.truncate(cap);
}

/// Recency list stored under a dotted key of a [`JsonDb`]
pub struct JsonRecencyStore {
    db: Arc<JsonDb>,
    key: String,
    max_entries: usize,
    /// Serialises read-modify-write in `record`
    lock: tokio::sync::Mutex<()>,
}

impl JsonRecencyStore {
    pub fn new(db: Arc<JsonDb>, key: impl Into<String>, max_entries: usize) -> Self {
        Self {
            db,
            key: key.into(),
            max_entries,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RecencyStore for JsonRecencyStore {
    async fn load(&self) -> Result<Vec<String>, PersistenceError> {
        let list = match self.db.fetch(&self.key).await {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                tracing::warn!(
                    "Ignoring action history at '{}': expected a list, found {}",
                    self.key,
                    other
                );
                Vec::new()
            }
            None => Vec::new(),
        };
        Ok(list)
    }

    async fn save(&self, list: &[String]) -> Result<(), PersistenceError> {
        let value = Value::Array(list.iter().cloned().map(Value::String).collect());
        self.db.push(&self.key, value).await
    }

    async fn record(&self, identifier: &str) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().await;
        let mut list = self.load().await?;
        promote(&mut list, identifier, self.max_entries);
        self.save(&list).await
    }
}

/// Recency list that lives only as long as the process
pub struct InMemoryRecencyStore {
    list: Mutex<Vec<String>>,
    max_entries: usize,
}

impl InMemoryRecencyStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            list: Mutex::new(Vec::new()),
            max_entries,
        }
    }

    /// Store pre-filled with `list`, most recent first
    pub fn with_entries(list: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let list: Vec<String> = list.into_iter().map(Into::into).collect();
        let max_entries = list.len().max(crate::config::DEFAULT_MAX_RECENCY_ENTRIES);
        Self {
            list: Mutex::new(list),
            max_entries,
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.list.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecencyStore for InMemoryRecencyStore {
    async fn load(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.snapshot())
    }

    async fn save(&self, list: &[String]) -> Result<(), PersistenceError> {
        *self.lock() = list.to_vec();
        Ok(())
    }

    async fn record(&self, identifier: &str) -> Result<(), PersistenceError> {
        promote(&mut self.lock(), identifier, self.max_entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_promote_moves_to_front() {
        let mut list = vec!["open".to_string(), "delete".to_string()];
        promote(&mut list, "delete", 10);
        assert_eq!(list, vec!["delete", "open"]);

        promote(&mut list, "expand", 10);
        assert_eq!(list, vec!["expand", "delete", "open"]);
    }

    #[test]
    fn test_promote_truncates() {
        let mut list: Vec<String> = (0..5).map(|i| format!("cmd{}", i)).collect();
        promote(&mut list, "new", 3);
        assert_eq!(list, vec!["new", "cmd0", "cmd1"]);
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(JsonDb::new(temp_dir.path().join("db.json")));
        let store = JsonRecencyStore::new(Arc::clone(&db), "explorer.actionMru", 50);

        assert!(store.load().await.unwrap().is_empty());
        store.record("open").await.unwrap();
        store.record("delete").await.unwrap();
        store.record("open").await.unwrap();

        assert_eq!(store.load().await.unwrap(), vec!["open", "delete"]);

        // A second store over the same file sees the same history
        let reopened = JsonRecencyStore::new(
            Arc::new(JsonDb::new(temp_dir.path().join("db.json"))),
            "explorer.actionMru",
            50,
        );
        assert_eq!(reopened.load().await.unwrap(), vec!["open", "delete"]);
    }

    #[tokio::test]
    async fn test_json_store_ignores_non_list() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(JsonDb::new(temp_dir.path().join("db.json")));
        db.push("explorer.actionMru", serde_json::json!({"bogus": true}))
            .await
            .unwrap();

        let store = JsonRecencyStore::new(db, "explorer.actionMru", 50);
        assert!(store.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(JsonDb::new(temp_dir.path().join("db.json")));
        // "explorer" is a scalar, so the nested key cannot be written
        db.push("explorer", serde_json::json!(1)).await.unwrap();

        let store = JsonRecencyStore::new(db, "explorer.actionMru", 50);
        assert!(store.record("open").await.is_err());
        assert!(store.load_or_empty().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryRecencyStore::new(2);
        store.record("a").await.unwrap();
        store.record("b").await.unwrap();
        store.record("c").await.unwrap();
        assert_eq!(store.snapshot(), vec!["c", "b"]);
    }
}
