//! Background dispatcher that drains the outbox and delivers its side effects.
//!
//! Events are marked published once their side effect was attempted. A mail
//! that fails to send is logged and counted but not retried, so one bad
//! address cannot hold back the rest of the queue.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::models::OutboxEvent;
use crate::telemetry::record_mail_delivery;
use crate::DbPool;

use super::mailer::Mailer;
use super::outbox::OutboxService;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub retention_days: i32,
    pub cleanup_interval_polls: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            retention_days: 7,
            cleanup_interval_polls: 3600,
        }
    }
}

pub struct OutboxDispatcher {
    db_pool: DbPool,
    mailer: Mailer,
    config: DispatcherConfig,
}

impl OutboxDispatcher {
    pub fn new(db_pool: DbPool, mailer: Mailer, config: DispatcherConfig) -> Self {
        Self {
            db_pool,
            mailer,
            config,
        }
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        shutdown_tx
    }

    #[instrument(skip(self, shutdown_rx), name = "outbox_dispatcher")]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox dispatcher started"
        );

        let mut poll_timer = interval(self.config.poll_interval);
        let mut poll_count: u32 = 0;

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    poll_count = poll_count.wrapping_add(1);

                    if let Err(e) = self.dispatch_batch().await {
                        error!(error = %e, "Error dispatching outbox events");
                    }

                    if poll_count.is_multiple_of(self.config.cleanup_interval_polls) {
                        if let Err(e) = self.cleanup().await {
                            warn!(error = %e, "Error during outbox cleanup");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Outbox dispatcher received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("Draining remaining events before shutdown...");
        for _ in 0..3 {
            match self.dispatch_batch().await {
                Ok(0) => break,
                Ok(n) => debug!(count = n, "Drained events"),
                Err(e) => {
                    error!(error = %e, "Error during final drain");
                    break;
                }
            }
        }

        info!("Outbox dispatcher stopped");
    }

    /// Handles one batch and returns how many events it marked published.
    #[instrument(skip(self))]
    pub async fn dispatch_batch(&self) -> Result<usize, DispatchError> {
        let batch_size = self.config.batch_size;
        let events = self
            .blocking(move |conn| OutboxService::pending(conn, batch_size))
            .await?;

        if events.is_empty() {
            return Ok(0);
        }
        debug!(count = events.len(), "Fetched unpublished events");

        for event in &events {
            self.deliver(event).await;
        }

        let event_ids: Vec<_> = events.iter().map(|e| e.id).collect();
        self.blocking(move |conn| OutboxService::mark_published(conn, &event_ids))
            .await?;

        Ok(events.len())
    }

    async fn deliver(&self, event: &OutboxEvent) {
        let email = match self.mailer.compose(event) {
            Ok(Some(email)) => email,
            Ok(None) => {
                debug!(event_id = %event.id, event_type = %event.event_type, "No side effect for event");
                return;
            }
            Err(e) => {
                warn!(event_id = %event.id, event_type = %event.event_type, error = %e, "Skipping undeliverable event");
                return;
            }
        };

        match self.mailer.send(&email).await {
            Ok(()) => {
                record_mail_delivery(&event.event_type, true);
                info!(event_id = %event.id, event_type = %event.event_type, "Mail dispatched");
            }
            Err(e) => {
                record_mail_delivery(&event.event_type, false);
                warn!(event_id = %event.id, event_type = %event.event_type, error = %e, "Mail delivery failed");
            }
        }
    }

    #[instrument(skip(self))]
    async fn cleanup(&self) -> Result<usize, DispatchError> {
        let retention_days = self.config.retention_days;
        self.blocking(move |conn| OutboxService::prune_published(conn, retention_days))
            .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    {
        let pool = self.db_pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DispatchError::Database(e.to_string()))?;
            f(&mut conn).map_err(|e| DispatchError::Database(e.to_string()))
        })
        .await
        .map_err(|e| DispatchError::Task(e.to_string()))?
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Task error: {0}")]
    Task(String),
}

pub struct OutboxDispatcherBuilder {
    db_pool: DbPool,
    mailer: Mailer,
    config: DispatcherConfig,
}

impl OutboxDispatcherBuilder {
    pub fn new(db_pool: DbPool, mailer: Mailer) -> Self {
        Self {
            db_pool,
            mailer,
            config: DispatcherConfig::default(),
        }
    }

    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    pub fn batch_size(mut self, size: i64) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn retention_days(mut self, days: i32) -> Self {
        self.config.retention_days = days;
        self
    }

    pub fn build(self) -> OutboxDispatcher {
        OutboxDispatcher::new(self.db_pool, self.mailer, self.config)
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        self.build().spawn()
    }
}
