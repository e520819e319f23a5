use estatehub::{
    cache::create_redis_pool,
    create_db_pool, create_router,
    events::{Mailer, OutboxDispatcherBuilder},
    init_tracing, shutdown_telemetry, AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "estatehub",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    for issue in config.validate_for_production() {
        warn!(issue = %issue, "Configuration warning");
    }

    info!(
        database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let db_pool = create_db_pool(&config);

    info!("Database connection pool created");

    let mailer = Mailer::new(config.mail.clone()).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build mail client");
        std::process::exit(1);
    });
    if !config.mail.is_configured() {
        warn!("Mail API not configured, outgoing mail will only be logged");
    }
    let dispatcher_shutdown = OutboxDispatcherBuilder::new(db_pool.clone(), mailer).spawn();

    let redis_pool = create_redis_pool(&config.redis);
    let state = AppState::new(db_pool, redis_pool, &config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to load JWT signing key");
        std::process::exit(1);
    });

    // Warm the storage check so the first upload does not pay for it.
    state.storage_health.check_now().await;

    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    {
        error!(error = %e, "HTTP server error");
    }

    info!("Shutting down outbox dispatcher...");
    let _ = dispatcher_shutdown.send(true);
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    shutdown_telemetry();

    info!("Server shutdown complete");
}
