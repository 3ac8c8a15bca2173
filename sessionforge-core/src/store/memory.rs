//! In-memory secret storage implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Secret, SecretStore, StoreError};

/// In-memory secret store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
/// Writes can be made to fail with [`fail_writes`](Self::fail_writes) to
/// exercise best-effort code paths.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Secret>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<String, Secret>) -> Self {
        Self {
            data: RwLock::new(data),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `set` call fail with a backend error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::BackendError {
                message: format!("simulated write failure for {}", key),
            });
        }
        self.data.write().insert(key.to_string(), secret.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get() {
        let store = MemoryStore::new();
        let secret = Secret::new("test-value");

        store.set("test-key", &secret).await.unwrap();
        let retrieved = store.get("test-key").await.unwrap();

        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().expose(), "test-value");
    }

    #[tokio::test]
    async fn test_memory_store_get_nonexistent() {
        let store = MemoryStore::new();
        let result = store.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryStore::new();
        store.set("test-key", &Secret::new("test-value")).await.unwrap();
        store.delete("test-key").await.unwrap();

        assert!(store.get("test-key").await.unwrap().is_none());
        // Idempotent
        store.delete("test-key").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_simulated_failure() {
        let store = MemoryStore::new();
        store.fail_writes(true);

        let result = store.set("test-key", &Secret::new("v")).await;
        assert!(matches!(result, Err(StoreError::BackendError { .. })));
        assert!(store.is_empty());
    }
}
