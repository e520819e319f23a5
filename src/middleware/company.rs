//! Current-company middleware for company-scoped routes.
//!
//! Runs after [`auth_middleware`](super::auth::auth_middleware). It resolves
//! the caller's current company from the session, persists the session when
//! resolution changed it, and hands the result to handlers as a
//! [`TenantContext`].

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use crate::error::{get_db_conn, ApiError, DomainError};
use crate::middleware::auth::AuthUser;
use crate::telemetry::{record_company_resolution, record_tenant};
use crate::tenancy::{
    context, membership, AccessProfile, CompanySnapshot, Outcome, SessionRecord,
};
use crate::AppState;

/// Set by clients that want the current company recomputed even when the
/// cached one is still valid.
pub const REFRESH_COMPANY_HEADER: &str = "x-refresh-company";

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub company: CompanySnapshot,
    pub profile: AccessProfile,
}

impl TenantContext {
    pub fn company_id(&self) -> i32 {
        self.company.id
    }
}

fn reject(err: DomainError) -> Response {
    let (status, body): (StatusCode, Json<ApiError>) = err.into();
    (status, body).into_response()
}

fn refresh_requested(headers: &HeaderMap) -> bool {
    headers
        .get(REFRESH_COMPANY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

pub async fn company_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| reject(DomainError::Unauthenticated))?;
    let session = req
        .extensions()
        .get::<SessionRecord>()
        .cloned()
        .ok_or_else(|| reject(DomainError::Unauthenticated))?;

    let (profile, accessible) = {
        let mut conn = get_db_conn(&state.db_pool).map_err(IntoResponse::into_response)?;
        let profile = membership::load_profile(&mut conn, auth.user_id)
            .map_err(|e| reject(e.into()))?;
        let accessible = membership::accessible_companies(&mut conn, &profile)
            .map_err(|e| reject(e.into()))?;
        (profile, accessible)
    };

    let resolution = context::resolve(&session, refresh_requested(req.headers()), &accessible);
    record_company_resolution(resolution.outcome.as_str());

    if resolution.changed {
        if resolution.outcome == Outcome::Refreshed {
            info!(
                user_id = %auth.user_id,
                previous = ?session.current_company().map(|c| c.id),
                current = ?resolution.session.current_company().map(|c| c.id),
                "Current company recomputed"
            );
        }
        if let Err(e) = state
            .sessions
            .put(auth.session_id, &resolution.session)
            .await
        {
            error!(error = %e, session_id = %auth.session_id, "Failed to persist session");
            return Err(
                ApiError::unavailable("Session store unavailable", "SESSION_STORE_ERROR")
                    .into_response(),
            );
        }
    }

    let company = resolution.company().map_err(reject)?.clone();
    record_tenant(auth.user_id, company.id);

    req.extensions_mut().insert(resolution.session);
    req.extensions_mut().insert(TenantContext { company, profile });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_refresh_header_values() {
        let mut headers = HeaderMap::new();
        assert!(!refresh_requested(&headers));

        headers.insert(REFRESH_COMPANY_HEADER, HeaderValue::from_static("true"));
        assert!(refresh_requested(&headers));

        headers.insert(REFRESH_COMPANY_HEADER, HeaderValue::from_static("1"));
        assert!(refresh_requested(&headers));

        headers.insert(REFRESH_COMPANY_HEADER, HeaderValue::from_static("no"));
        assert!(!refresh_requested(&headers));
    }
}
