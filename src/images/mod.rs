//! Polymorphic image attachments for properties.

pub mod manager;
pub mod paths;

use std::sync::Arc;

use axum::body::Bytes;
use diesel::PgConnection;
use tracing::{error, warn};

use crate::config::ImageConfig;
use crate::error::DomainError;
use crate::models::PropertyImage;
use crate::properties::TargetRef;
use crate::storage::{SharedStore, StorageHealth};
use crate::telemetry::record_image_operation;

pub use manager::{DeletedImage, ImageUpload};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub content_type: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub display_order: Option<i32>,
}

/// Coordinates the database rows with the objects in storage.
#[derive(Clone)]
pub struct ImageService {
    store: SharedStore,
    health: Arc<StorageHealth>,
    config: ImageConfig,
}

impl ImageService {
    pub fn new(store: SharedStore, health: Arc<StorageHealth>, config: ImageConfig) -> Self {
        Self {
            store,
            health,
            config,
        }
    }

    pub fn public_url(&self, image: &PropertyImage) -> String {
        self.store.public_url(&image.path)
    }

    pub fn max_per_target(&self) -> i64 {
        self.config.max_per_target
    }

    /// Content type and size checks. Returns the file extension to store with.
    pub fn validate_upload(
        &self,
        content_type: &str,
        size: usize,
    ) -> Result<&'static str, DomainError> {
        if size == 0 {
            return Err(DomainError::validation("file", "The uploaded file is empty."));
        }
        if size > self.config.max_upload_bytes {
            return Err(DomainError::validation(
                "file",
                format!(
                    "Images may be at most {} bytes.",
                    self.config.max_upload_bytes
                ),
            ));
        }

        let allowed = self
            .config
            .allowed_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type));
        match paths::extension_for(content_type) {
            Some(ext) if allowed => Ok(ext),
            _ => Err(DomainError::validation(
                "file",
                format!("Unsupported image type '{}'.", content_type),
            )),
        }
    }

    pub async fn upload(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        target: TargetRef,
        request: UploadRequest,
    ) -> Result<PropertyImage, DomainError> {
        let result = self.try_upload(conn, company_id, target, request).await;
        record_image_operation("upload", result.is_ok());
        result
    }

    async fn try_upload(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        target: TargetRef,
        request: UploadRequest,
    ) -> Result<PropertyImage, DomainError> {
        let ext = self.validate_upload(&request.content_type, request.bytes.len())?;
        manager::precheck_upload(conn, company_id, target, self.config.max_per_target)?;
        self.health.ensure_writable().await?;

        let path = paths::object_path(company_id, target, chrono::Utc::now(), ext);
        let size_bytes = request.bytes.len() as i64;

        self.store
            .put(&path, request.bytes, &request.content_type)
            .await
            .map_err(|e| DomainError::Storage(e.to_string()))?;

        let inserted = manager::insert_image(
            conn,
            company_id,
            target,
            ImageUpload {
                path: path.clone(),
                caption: request.caption,
                requested_primary: request.is_primary,
                display_order: request.display_order,
                content_type: request.content_type.to_ascii_lowercase(),
                size_bytes,
            },
            self.config.max_per_target,
        );

        if inserted.is_err() {
            if let Err(e) = self.store.delete(&path).await {
                warn!(error = %e, path = %path, "Failed to remove orphaned upload");
            }
        }
        inserted
    }

    pub async fn delete(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        image_id: i32,
    ) -> Result<DeletedImage, DomainError> {
        let result = async {
            manager::load_image(conn, company_id, image_id)?;
            self.health.ensure_writable().await?;
            let deleted = manager::delete_image(conn, company_id, image_id)?;
            self.remove_objects(std::slice::from_ref(&deleted.image.path))
                .await;
            Ok(deleted)
        }
        .await;

        record_image_operation("delete", result.is_ok());
        result
    }

    pub fn set_primary(
        &self,
        conn: &mut PgConnection,
        company_id: i32,
        image_id: i32,
    ) -> Result<PropertyImage, DomainError> {
        let result = manager::set_primary(conn, company_id, image_id);
        record_image_operation("set_primary", result.is_ok());
        result
    }

    /// Best effort: a stored object whose row is gone is only logged.
    pub async fn remove_objects(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.store.delete(path).await {
                error!(error = %e, path = %path, "Failed to delete stored image");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::storage::MemoryStore;

    fn service() -> ImageService {
        let store: SharedStore = Arc::new(MemoryStore::new("/media"));
        let health = Arc::new(StorageHealth::new(store.clone(), Duration::from_secs(300)));
        ImageService::new(store, health, Config::default_for_testing().images)
    }

    #[test]
    fn test_upload_validation() {
        let svc = service();

        assert_eq!(svc.validate_upload("image/png", 10).unwrap(), "png");
        assert!(matches!(
            svc.validate_upload("application/pdf", 10),
            Err(DomainError::Validation {
                field: Some("file"),
                ..
            })
        ));
        assert!(svc.validate_upload("image/png", 0).is_err());
        assert!(svc
            .validate_upload("image/png", svc.config.max_upload_bytes + 1)
            .is_err());
    }
}
