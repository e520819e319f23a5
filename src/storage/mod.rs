//! Object storage behind a small async trait.
//!
//! Images only need put/get/delete, a bucket reachability check and a way to
//! turn a stored path into a public URL.

pub mod health;
pub mod local;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;

use crate::config::{StorageBackend, StorageConfig};

pub use health::{StorageHealth, StorageStatus};
pub use local::LocalStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("bucket unreachable: {0}")]
    Unreachable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, path: &str) -> Result<Bytes, StorageError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    async fn head_bucket(&self) -> Result<(), StorageError>;

    fn public_url(&self, path: &str) -> String;
}

pub type SharedStore = Arc<dyn ObjectStore>;

pub fn create_store(config: &StorageConfig) -> SharedStore {
    match config.backend {
        StorageBackend::Local => Arc::new(LocalStore::new(
            &config.root,
            &config.bucket,
            &config.public_base_url,
        )),
        StorageBackend::Memory => Arc::new(MemoryStore::new(&config.public_base_url)),
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(
            join_url("http://cdn.test/media/", "/companies/1/units/7/a.jpg"),
            "http://cdn.test/media/companies/1/units/7/a.jpg"
        );
        assert_eq!(join_url("/media", "x.png"), "/media/x.png");
    }
}
