//! EstateHub - Multi-tenant property management with company-scoped access control.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod finances;
pub mod handlers;
pub mod images;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod properties;
pub mod schema;
pub mod storage;
pub mod telemetry;
pub mod tenancy;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::{JwtConfig, KeyError};
use auth::password::PasswordPolicy;
use cache::{create_redis_pool, SessionStore};
use images::ImageService;
use middleware::{
    auth_middleware, company_middleware, metrics::metrics_middleware, request_id_middleware,
};
use storage::{create_store, SharedStore, StorageHealth};
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Slack on top of the image size limit for multipart framing and text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub jwt_config: Arc<JwtConfig>,
    pub sessions: SessionStore,
    pub storage_health: Arc<StorageHealth>,
    pub images: ImageService,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub metrics: MetricsState,
}

impl AppState {
    pub fn new(
        db_pool: DbPool,
        redis_pool: Option<deadpool_redis::Pool>,
        config: &Config,
    ) -> Result<Self, KeyError> {
        Self::with_store(db_pool, redis_pool, config, create_store(&config.storage))
    }

    /// Builds the state over an already constructed object store.
    pub fn with_store(
        db_pool: DbPool,
        redis_pool: Option<deadpool_redis::Pool>,
        config: &Config,
        store: SharedStore,
    ) -> Result<Self, KeyError> {
        let jwt_config = JwtConfig::from_env()?
            .with_expiry(
                config.jwt.access_token_expiry_secs,
                config.jwt.refresh_token_expiry_secs,
            )
            .with_claims_scope(config.jwt.issuer.clone(), config.jwt.audience.clone());

        let redis_pool = redis_pool.or_else(|| create_redis_pool(&config.redis));
        let sessions = SessionStore::new(redis_pool, config.session.ttl_secs);

        let storage_health = Arc::new(StorageHealth::new(
            store.clone(),
            Duration::from_secs(config.storage.health_cache_secs),
        ));
        let images = ImageService::new(store, storage_health.clone(), config.images.clone());

        Ok(Self {
            db_pool,
            jwt_config: Arc::new(jwt_config),
            sessions,
            storage_health,
            images,
            password_policy: PasswordPolicy::from_config(&config.security),
            password_hash_cost: config.security.password_hash_cost,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
        })
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let upload_limit = config.images.max_upload_bytes + MULTIPART_OVERHEAD;
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size.max(upload_limit));

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route("/health/storage", get(handlers::health::storage_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh_token))
        .route("/auth/verify-email", post(handlers::auth::verify_email))
        .route(
            "/auth/complete-registration",
            post(handlers::auth::complete_registration),
        )
        .with_state(state.clone());

    // Authenticated, but usable before a current company exists.
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/companies",
            get(handlers::companies::list_companies).post(handlers::companies::create_company),
        )
        .route("/companies/switch", post(handlers::companies::switch_company))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let company_routes = Router::new()
        .route(
            "/company",
            get(handlers::companies::get_current_company)
                .put(handlers::companies::update_current_company),
        )
        .route("/members", get(handlers::members::list_members))
        .route("/members/invite", post(handlers::members::invite_member))
        .route(
            "/members/{access_id}",
            delete(handlers::members::remove_member),
        )
        .route(
            "/members/{access_id}/role",
            put(handlers::members::change_member_role),
        )
        .route(
            "/estates",
            get(handlers::properties::list_estates).post(handlers::properties::create_estate),
        )
        .route(
            "/estates/{id}",
            get(handlers::properties::get_estate).delete(handlers::properties::delete_estate),
        )
        .route(
            "/buildings",
            get(handlers::properties::list_buildings).post(handlers::properties::create_building),
        )
        .route(
            "/buildings/{id}",
            get(handlers::properties::get_building).delete(handlers::properties::delete_building),
        )
        .route(
            "/units",
            get(handlers::properties::list_units).post(handlers::properties::create_unit),
        )
        .route(
            "/units/{id}",
            get(handlers::properties::get_unit).delete(handlers::properties::delete_unit),
        )
        .route(
            "/subunits",
            get(handlers::properties::list_sub_units).post(handlers::properties::create_sub_unit),
        )
        .route(
            "/subunits/{id}",
            get(handlers::properties::get_sub_unit).delete(handlers::properties::delete_sub_unit),
        )
        .route(
            "/properties/{kind}/{id}/images",
            get(handlers::images::list_images)
                .post(handlers::images::upload_image)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/images/{id}",
            patch(handlers::images::update_image).delete(handlers::images::delete_image),
        )
        .route(
            "/images/{id}/primary",
            post(handlers::images::set_primary_image),
        )
        .route(
            "/finances/categories",
            get(handlers::finances::list_categories).post(handlers::finances::create_category),
        )
        .route(
            "/finances/transactions",
            get(handlers::finances::list_transactions)
                .post(handlers::finances::create_transaction),
        )
        .route(
            "/finances/purchases",
            get(handlers::finances::list_purchases).post(handlers::finances::create_purchase),
        )
        .route(
            "/finances/recurring",
            get(handlers::finances::list_recurring).post(handlers::finances::create_recurring),
        )
        .route(
            "/finances/recurring/{id}/generate",
            post(handlers::finances::generate_recurring),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            company_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .merge(company_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found", "code": "NOT_FOUND"})),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::{HeaderValue, Method};

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let origins = || -> Vec<HeaderValue> {
        config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect()
    };

    let cors = match (config.cors.allow_credentials, is_wildcard_origin) {
        (true, true) => CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_credentials(true),
        (true, false) => CorsLayer::new()
            .allow_origin(origins())
            .allow_credentials(true),
        (false, true) => CorsLayer::new().allow_origin(Any),
        (false, false) => CorsLayer::new().allow_origin(origins()),
    };

    cors.allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.cors.max_age_secs))
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(600)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins_with_credentials() {
        let mut config = Config::default_for_testing();
        config.cors.allow_credentials = true;
        config.cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://app.estatehub.test".to_string(),
        ];
        let _ = build_cors_layer(&config);
    }
}
