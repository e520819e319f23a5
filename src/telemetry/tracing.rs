//! Log output, request spans and the OTLP exporter for estatehub.
//!
//! Every request runs inside a `request` span carrying its correlation id.
//! The span declares `user_id` and `company_id` up front and the tenancy
//! middleware fills them in once the caller's company is resolved, so each
//! log line below it names the tenant it was written for.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing::{field, info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::{Config, Environment, LogFormat, TelemetryConfig};

pub const SERVICE_NAME: &str = "estatehub";

/// Connection pool and HTTP client internals are noisy at debug level.
const QUIET_TARGETS: [&str; 4] = ["r2d2=warn", "hyper=warn", "h2=warn", "tower_http=info"];

/// `RUST_LOG` wins when set. Otherwise the configured level applies to
/// everything except the targets in `QUIET_TARGETS`.
pub fn filter_directives(level: &str) -> String {
    std::iter::once(level)
        .chain(QUIET_TARGETS)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn init_telemetry(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.logging.level)));

    let otel_layer = create_otel_tracer(&config.telemetry, &config.server.environment)
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match config.logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

fn service_name(config: &TelemetryConfig) -> String {
    let name = config.service_name.trim();
    if name.is_empty() {
        SERVICE_NAME.to_string()
    } else {
        name.to_string()
    }
}

fn service_resource(config: &TelemetryConfig, environment: &Environment) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", service_name(config)),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("deployment.environment", environment.as_str()),
    ])
}

fn create_otel_tracer(
    config: &TelemetryConfig,
    environment: &Environment,
) -> Option<sdktrace::Tracer> {
    let endpoint = config.otlp_endpoint.as_ref()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .ok()?;

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(service_resource(config, environment))
        .build();

    let tracer = provider.tracer(SERVICE_NAME);
    global::set_tracer_provider(provider);
    Some(tracer)
}

/// The span every request runs in. Tenant fields start empty.
pub fn request_span(request_id: &str, method: &str, uri: &str) -> Span {
    info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        user_id = field::Empty,
        company_id = field::Empty,
    )
}

/// Fills the tenant fields of the current request span.
pub fn record_tenant(user_id: Uuid, company_id: i32) {
    let span = Span::current();
    span.record("user_id", field::display(user_id));
    span.record("company_id", company_id);
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
