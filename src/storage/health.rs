//! Cached reachability of the object store.
//!
//! Write paths call [`StorageHealth::ensure_writable`] before touching
//! storage so an outage surfaces as "temporarily unavailable" instead of a
//! failure deep inside an upload.

use std::time::{Duration, Instant};

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::DomainError;
use crate::telemetry::record_storage_health;

use super::{SharedStore, StorageError};

pub const CHECK_KEY: &str = "_health_check_test";
const CHECK_BODY: &[u8] = b"estatehub storage check";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StorageStatus {
    pub is_healthy: bool,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    checked_at: Option<Instant>,
}

impl StorageStatus {
    fn is_fresh(&self, max_age: Duration) -> bool {
        self.checked_at
            .map(|at| at.elapsed() < max_age)
            .unwrap_or(false)
    }
}

pub struct StorageHealth {
    store: SharedStore,
    max_age: Duration,
    cached: RwLock<Option<StorageStatus>>,
}

impl StorageHealth {
    pub fn new(store: SharedStore, max_age: Duration) -> Self {
        Self {
            store,
            max_age,
            cached: RwLock::new(None),
        }
    }

    /// Cached status, re-checked once it is older than the cache period.
    pub async fn status(&self) -> StorageStatus {
        if let Some(status) = self.cached.read().await.as_ref() {
            if status.is_fresh(self.max_age) {
                return status.clone();
            }
        }
        self.check_now().await
    }

    pub async fn check_now(&self) -> StorageStatus {
        let start = Instant::now();
        let result = self.round_trip().await;
        record_storage_health(result.is_ok(), start.elapsed());

        let status = StorageStatus {
            is_healthy: result.is_ok(),
            last_checked: Utc::now(),
            error: result.as_ref().err().map(ToString::to_string),
            checked_at: Some(Instant::now()),
        };

        let previous = self.cached.write().await.replace(status.clone());
        let was_healthy = previous.map(|p| p.is_healthy);
        match (&result, was_healthy) {
            (Err(e), Some(true) | None) => warn!(error = %e, "Object storage is unhealthy"),
            (Ok(()), Some(false)) => info!("Object storage recovered"),
            _ => {}
        }

        status
    }

    pub async fn ensure_writable(&self) -> Result<(), DomainError> {
        if self.status().await.is_healthy {
            Ok(())
        } else {
            Err(DomainError::StorageUnavailable)
        }
    }

    async fn round_trip(&self) -> Result<(), StorageError> {
        self.store.head_bucket().await?;
        self.store
            .put(CHECK_KEY, Bytes::from_static(CHECK_BODY), "text/plain")
            .await?;
        let read = self.store.get(CHECK_KEY).await?;
        self.store.delete(CHECK_KEY).await?;

        if read.as_ref() != CHECK_BODY {
            return Err(StorageError::Unreachable(
                "check object read back with different content".to_string(),
            ));
        }
        Ok(())
    }
}
