//! Checks the configured object storage once and prints the result.
//!
//! Exits with status 1 when the store is unreachable, so it can back a
//! container health check or a deploy gate.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use estatehub::{
    init_tracing,
    storage::{create_store, StorageHealth},
    Config,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    init_tracing(&config);

    let store = create_store(&config.storage);
    let health = Arc::new(StorageHealth::new(
        store,
        Duration::from_secs(config.storage.health_cache_secs),
    ));

    let status = health.check_now().await;
    match serde_json::to_string_pretty(&status) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("failed to render status: {}", e),
    }

    if status.is_healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
