//! Redis connection pool and the session store built on it.

pub mod session_store;

use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use tracing::{info, warn};

use crate::config::RedisConfig;

pub use session_store::{SessionError, SessionStore};

pub fn create_redis_pool(config: &RedisConfig) -> Option<Pool> {
    let url = config.url.as_ref()?;

    let timeout = std::time::Duration::from_secs(config.connection_timeout_secs);
    let cfg = RedisPoolConfig::from_url(url);
    let pool = cfg.builder().ok().and_then(|b| {
        b.max_size(config.pool_size)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .ok()
    });

    let host = url.split('@').next_back().unwrap_or("***");
    match &pool {
        Some(_) => info!(redis_url = %host, "Redis pool created"),
        None => warn!(redis_url = %host, "Invalid Redis configuration, falling back to memory"),
    }

    pool
}
