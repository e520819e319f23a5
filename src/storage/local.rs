use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use tracing::debug;

use super::{join_url, ObjectStore, StorageError};

/// Filesystem-backed store. The bucket is a directory under `root`.
pub struct LocalStore {
    bucket_dir: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: &str, bucket: &str, public_base_url: &str) -> Self {
        Self {
            bucket_dir: Path::new(root).join(bucket),
            public_base_url: public_base_url.to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.bucket_dir.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, path: &str, bytes: Bytes, _content_type: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &bytes).await?;
        debug!(path, size = bytes.len(), "Object written");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn head_bucket(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.bucket_dir).await?;
        let meta = tokio::fs::metadata(&self.bucket_dir).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Unreachable(format!(
                "{} is not a directory",
                self.bucket_dir.display()
            )))
        }
    }

    fn public_url(&self, path: &str) -> String {
        join_url(&self.public_base_url, path)
    }
}
