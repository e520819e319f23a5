//! Application metrics using the metrics crate.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { handle: None };
        }

        let handle = PROMETHEUS_HANDLE.get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        });

        Self {
            handle: Some(handle.clone()),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    AccountInactive,
    PasswordNotSet,
    TokenExpired,
    SessionExpired,
}

impl AuthOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::AccountInactive => "account_inactive",
            AuthOutcome::PasswordNotSet => "password_not_set",
            AuthOutcome::TokenExpired => "token_expired",
            AuthOutcome::SessionExpired => "session_expired",
        }
    }
}

pub fn record_auth_attempt(action: &str, outcome: AuthOutcome) {
    counter!(
        "auth_attempts_total",
        "action" => action.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

/// `outcome` is one of `cached`, `refreshed` or `no_company`.
pub fn record_company_resolution(outcome: &'static str) {
    counter!("company_resolution_total", "outcome" => outcome).increment(1);
}

pub fn record_image_operation(operation: &'static str, success: bool) {
    counter!(
        "image_operations_total",
        "operation" => operation,
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

pub fn record_storage_health(healthy: bool, duration: std::time::Duration) {
    gauge!("storage_healthy").set(if healthy { 1.0 } else { 0.0 });
    histogram!("storage_health_check_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_mail_delivery(event_type: &str, delivered: bool) {
    counter!(
        "mail_deliveries_total",
        "event_type" => event_type.to_string(),
        "delivered" => delivered.to_string()
    )
    .increment(1);
}

pub fn record_request_latency(
    method: &str,
    path: &str,
    status: u16,
    duration: std::time::Duration,
) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}
