//! Authentication middleware.
//!
//! A request is authenticated when its bearer token verifies and the session
//! the token names still exists. Logging out deletes the session, which
//! invalidates every access token issued for it.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::tenancy::SessionRecord;
use crate::telemetry::{record_auth_attempt, AuthOutcome};
use crate::AppState;

/// Identity of the caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub session_id: Uuid,
}

fn bearer_token(req: &Request) -> Result<&str, Response> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized("Missing authorization header", "MISSING_AUTH_HEADER")
                .into_response()
        })?;

    value.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::unauthorized("Invalid authorization header format", "INVALID_AUTH_FORMAT")
            .into_response()
    })
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = bearer_token(&req)?;

    let claims = state.jwt_config.verify_access_token(token).map_err(|e| {
        debug!(error = %e, "Access token rejected");
        record_auth_attempt("access", AuthOutcome::TokenExpired);
        ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN").into_response()
    })?;

    let (Some(user_id), Some(session_id)) = (claims.user_id(), claims.session_id()) else {
        warn!(sub = %claims.sub, "Access token with malformed subject or session");
        return Err(ApiError::unauthorized("Invalid token", "INVALID_TOKEN").into_response());
    };

    let session: SessionRecord = match state.sessions.get(session_id).await {
        Ok(Some(session)) if session.user_id == user_id => session,
        Ok(_) => {
            record_auth_attempt("access", AuthOutcome::SessionExpired);
            return Err(
                ApiError::unauthorized("Session has ended", "SESSION_EXPIRED").into_response(),
            );
        }
        Err(e) => {
            error!(error = %e, session_id = %session_id, "Session lookup failed");
            return Err(
                ApiError::unavailable("Session store unavailable", "SESSION_STORE_ERROR")
                    .into_response(),
            );
        }
    };

    req.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email.clone(),
        session_id,
    });
    req.extensions_mut().insert(session);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
