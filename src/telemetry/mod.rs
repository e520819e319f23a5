//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_auth_attempt, record_company_resolution, record_image_operation, record_mail_delivery,
    record_storage_health, AuthOutcome, MetricsState,
};
pub use tracing::{init_telemetry, record_tenant, request_span};
