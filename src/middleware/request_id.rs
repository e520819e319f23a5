//! Request correlation ids.
//!
//! The id is taken from `x-request-id` when the caller sends a sane one,
//! generated otherwise, echoed on the response and written into the metadata
//! of every outbox event the request produces.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header::HeaderName, request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::telemetry::request_span;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Accepts the caller's id if it is short and limited to `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owned copy for event metadata.
    pub fn to_metadata(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handlers take `RequestId` directly. Outside the middleware (unit tests,
/// nested routers) a fresh id is minted.
impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_default())
    }
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(RequestId::parse)
        .unwrap_or_default();

    request.extensions_mut().insert(request_id.clone());

    let span = request_span(
        request_id.as_str(),
        request.method().as_str(),
        &request.uri().to_string(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(RequestId::new().as_str(), RequestId::new().as_str());
    }

    #[test]
    fn test_caller_ids_are_checked() {
        assert_eq!(RequestId::parse("abc-123_X").unwrap().as_str(), "abc-123_X");
        assert!(RequestId::parse(&"a".repeat(128)).is_some());

        assert!(RequestId::parse("").is_none());
        assert!(RequestId::parse("abc 123").is_none());
        assert!(RequestId::parse("abc/123").is_none());
        assert!(RequestId::parse("ünï").is_none());
        assert!(RequestId::parse(&"a".repeat(129)).is_none());
    }

    #[test]
    fn test_metadata_copy() {
        let id = RequestId::parse("req-7").unwrap();
        assert_eq!(id.to_metadata().as_deref(), Some("req-7"));
        assert_eq!(id.to_string(), "req-7");
    }
}
