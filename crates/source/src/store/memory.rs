use crate::error::Result;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local key-value store.
///
/// Values live in a `HashMap` behind a [`RwLock`] and are lost when the store
/// is dropped. Useful for tests and for hosts that do not persist progress.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}
impl MemoryStore {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_replaces_previous_value() {
        let store = MemoryStore::default();
        store.set("k", b"one").await.unwrap();
        store.set("k", b"two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = MemoryStore::default();
        assert!(!store.remove("missing").await.unwrap());
        store.set("k", b"v").await.unwrap();
        assert!(store.remove("k").await.unwrap());
        assert!(store.is_empty().await);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
