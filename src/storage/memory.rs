use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::RwLock;

use super::{join_url, ObjectStore, StorageError};

/// In-process store used by tests and local development.
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Bytes>>,
    reachable: AtomicBool,
    public_base_url: String,
}

impl MemoryStore {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            public_base_url: public_base_url.to_string(),
        }
    }

    /// Simulates an outage of the backing bucket.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unreachable("memory store offline".to_string()))
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, path: &str, bytes: Bytes, _content_type: &str) -> Result<(), StorageError> {
        self.check()?;
        self.objects.write().await.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, StorageError> {
        self.check()?;
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.check()?;
        self.objects.write().await.remove(path);
        Ok(())
    }

    async fn head_bucket(&self) -> Result<(), StorageError> {
        self.check()
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new("/media");
        store
            .put("a/b.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();

        assert_eq!(store.get("a/b.png").await.unwrap(), Bytes::from_static(b"png"));
        store.delete("a/b.png").await.unwrap();
        assert!(matches!(
            store.get("a/b.png").await,
            Err(StorageError::NotFound(_))
        ));
        store.delete("a/b.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new("/media");
        store.set_reachable(false);

        assert!(store.head_bucket().await.is_err());
        assert!(store
            .put("x", Bytes::from_static(b"1"), "image/png")
            .await
            .is_err());
    }
}
