//! Authentication handlers.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{
        password::PasswordService,
        verification::{complete_registration as finish_registration, verify_email as verify},
    },
    error::{get_db_conn, ApiError, ApiResult, DomainError},
    events::{
        AggregateType, EventMetadata, EventType, LoginSuccessPayload, OutboxService,
        UserRegisteredPayload,
    },
    middleware::{AuthUser, RequestId},
    models::{NewCompany, NewRefreshToken, NewUser, User},
    schema::{refresh_tokens, users},
    telemetry::{record_auth_attempt, record_company_resolution, AuthOutcome},
    tenancy::{context, membership, CompanySnapshot, SessionRecord},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "owner@acme.test")]
    pub email: String,
    #[schema(example = "Str0ng!pass")]
    pub password: String,
    #[schema(example = "Jane Doe")]
    pub full_name: Option<String>,
    /// Creates the company with the registering user as its owner.
    #[validate(length(min = 1, max = 255, message = "Company name must not be empty"))]
    #[schema(example = "Acme Properties")]
    pub company_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "owner@acme.test")]
    pub email: String,
    #[schema(example = "Str0ng!pass")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteRegistrationRequest {
    pub token: Uuid,
    #[schema(example = "Str0ng!pass")]
    pub password: String,
    #[schema(example = "Sam Invitee")]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "owner@acme.test")]
    pub email: String,
    #[schema(example = "Jane Doe")]
    pub full_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub current_company: Option<CompanySnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembershipResponse {
    pub company_id: i32,
    #[schema(example = "Acme Properties")]
    pub company_name: String,
    #[schema(example = "Company Owner")]
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
    #[schema(example = "Superadmin")]
    pub global_role: Option<String>,
    pub memberships: Vec<MembershipResponse>,
    pub current_company: Option<CompanySnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Email verified")]
    pub message: String,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn store_refresh_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    session_id: Uuid,
    token: &str,
    expires_in_secs: i64,
) -> Result<(), DieselError> {
    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            user_id,
            session_id,
            token_hash: hash_token(token),
            expires_at: (Utc::now() + Duration::seconds(expires_in_secs)).naive_utc(),
        })
        .execute(conn)?;
    Ok(())
}

/// Consumes a stored refresh token. Returns its user and session when it
/// existed and had not expired.
fn take_stored_token(
    conn: &mut PgConnection,
    token: &str,
) -> Result<Option<(Uuid, Uuid)>, DieselError> {
    let now = Utc::now().naive_utc();
    let row: Option<(Uuid, Uuid, chrono::NaiveDateTime)> =
        diesel::delete(refresh_tokens::table.filter(refresh_tokens::token_hash.eq(hash_token(token))))
            .returning((
                refresh_tokens::user_id,
                refresh_tokens::session_id,
                refresh_tokens::expires_at,
            ))
            .get_result(conn)
            .optional()?;

    Ok(row
        .filter(|(_, _, expires_at)| *expires_at >= now)
        .map(|(user_id, session_id, _)| (user_id, session_id)))
}

fn cleanup_expired_tokens(conn: &mut PgConnection, user_id: Uuid) {
    let result = diesel::delete(
        refresh_tokens::table
            .filter(refresh_tokens::user_id.eq(user_id))
            .filter(refresh_tokens::expires_at.lt(Utc::now().naive_utc())),
    )
    .execute(conn);

    if let Ok(count) = result {
        if count > 0 {
            info!(user_id = %user_id, deleted_count = count, "Cleaned up expired refresh tokens");
        }
    }
}

fn generate_tokens(
    state: &AppState,
    conn: &mut PgConnection,
    user: &User,
    session_id: Uuid,
) -> ApiResult<(String, String)> {
    let token_error = |e: jwt_simple::Error| {
        error!(error = %e, "Token generation failed");
        ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
    };

    let access_token = state
        .jwt_config
        .generate_access_token(user.id, &user.email, session_id)
        .map_err(token_error)?;
    let refresh_token = state
        .jwt_config
        .generate_refresh_token(user.id, session_id)
        .map_err(token_error)?;

    store_refresh_token(
        conn,
        user.id,
        session_id,
        &refresh_token,
        state.jwt_config.refresh_token_expiry,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        ApiError::internal("Token storage failed", "TOKEN_STORAGE_ERROR")
    })?;

    Ok((access_token, refresh_token))
}

/// Opens a session, fills its tenant snapshot and issues tokens bound to it.
pub(crate) async fn start_session(
    state: &AppState,
    conn: &mut PgConnection,
    user: &User,
) -> ApiResult<(String, String, Option<CompanySnapshot>)> {
    let profile = membership::load_profile(conn, user.id).map_err(DomainError::from)?;
    let accessible =
        membership::accessible_companies(conn, &profile).map_err(DomainError::from)?;

    let mut session = SessionRecord::new(user.id);
    let outcome = context::on_login(&mut session, &accessible);
    record_company_resolution(outcome.as_str());

    let session_id = state.sessions.create(&session).await.map_err(|e| {
        error!(error = %e, "Failed to create session");
        ApiError::unavailable("Session store unavailable", "SESSION_STORE_ERROR")
    })?;

    let (access_token, refresh_token) = generate_tokens(state, conn, user, session_id)?;
    Ok((access_token, refresh_token, session.current_company().cloned()))
}

fn hash_password(state: &AppState, password: &str) -> ApiResult<String> {
    state
        .password_policy
        .validate(password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    PasswordService::hash_password_with_cost(password, state.password_hash_cost).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "User already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let password_hash = hash_password(&state, &payload.password)?;
    let email = payload.email.trim().to_lowercase();
    let company_name = payload
        .company_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let mut conn = get_db_conn(&state.db_pool)?;

    let user = conn
        .transaction::<_, DomainError, _>(|conn| {
            let user: User = diesel::insert_into(users::table)
                .values(&NewUser {
                    email: email.clone(),
                    password_hash: Some(password_hash),
                    full_name: payload.full_name.clone(),
                    email_verified: false,
                    verification_token: Uuid::new_v4(),
                })
                .returning(User::as_returning())
                .get_result(conn)
                .map_err(|e| match e {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        DomainError::Conflict("User with this email already exists".to_string())
                    }
                    other => other.into(),
                })?;

            let company = company_name
                .map(|name| {
                    membership::create_company_with_owner(
                        conn,
                        user.id,
                        &NewCompany {
                            name,
                            trading_name: None,
                            business_email: Some(email.clone()),
                            phone: None,
                        },
                    )
                })
                .transpose()?;

            let metadata = EventMetadata::new()
                .with_user(user.id)
                .with_request_id(request_id.to_metadata());

            if let Some(company) = &company {
                OutboxService::emit(
                    conn,
                    EventType::CompanyCreated,
                    AggregateType::Company,
                    company.id,
                    &serde_json::json!({ "name": company.name, "owner_id": user.id }),
                    metadata.clone().with_company(company.id),
                )?;
            }

            OutboxService::emit(
                conn,
                EventType::UserRegistered,
                AggregateType::User,
                user.id,
                &UserRegisteredPayload {
                    email: user.email.clone(),
                    full_name: user.full_name.clone(),
                    verification_token: user.verification_token,
                    company_id: company.as_ref().map(|c| c.id),
                },
                metadata,
            )?;

            Ok(user)
        })
        .map_err(|e| {
            if matches!(e, DomainError::Conflict(_)) {
                warn!(email = %email, "Registration for existing email");
            }
            e
        })?;

    let (access_token, refresh_token, current_company) =
        start_session(&state, &mut conn, &user).await?;

    record_auth_attempt("register", AuthOutcome::Success);
    info!(user_id = %user.id, email = %user.email, company = ?current_company.as_ref().map(|c| c.id), "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            access_token,
            refresh_token,
            current_company,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Account inactive", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::email.eq(payload.email.trim().to_lowercase()))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| {
            warn!(email = %payload.email, "Login attempt for non-existent user");
            record_auth_attempt("login", AuthOutcome::InvalidCredentials);
            ApiError::unauthorized("Invalid credentials", "INVALID_CREDENTIALS")
        })?;

    if !user.is_active {
        warn!(user_id = %user.id, "Login attempt for inactive user");
        record_auth_attempt("login", AuthOutcome::AccountInactive);
        return Err(ApiError::forbidden("Account is inactive", "ACCOUNT_INACTIVE"));
    }

    if user.password_hash.is_none() {
        record_auth_attempt("login", AuthOutcome::PasswordNotSet);
        return Err(ApiError::unauthorized(
            "Registration has not been completed. Use the link in your invitation email.",
            "PASSWORD_NOT_SET",
        ));
    }

    let is_valid = PasswordService::verify_password(&payload.password, user.password_hash.as_deref())
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt - invalid password");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        return Err(ApiError::unauthorized("Invalid credentials", "INVALID_CREDENTIALS"));
    }

    cleanup_expired_tokens(&mut conn, user.id);

    let (access_token, refresh_token, current_company) =
        start_session(&state, &mut conn, &user).await?;

    let company_id = current_company.as_ref().map(|c| c.id);
    let mut metadata = EventMetadata::new()
        .with_user(user.id)
        .with_request_id(request_id.to_metadata());
    if let Some(id) = company_id {
        metadata = metadata.with_company(id);
    }
    if let Err(e) = OutboxService::emit(
        &mut conn,
        EventType::LoginSuccess,
        AggregateType::User,
        user.id,
        &LoginSuccessPayload {
            email: user.email.clone(),
            company_id,
        },
        metadata,
    ) {
        warn!(error = %e, "Failed to record login event");
    }

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, email = %user.email, company = ?company_id, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
        current_company,
    }))
}

/// Rotates the refresh token. The session is kept, so the current company
/// survives a refresh.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ApiError),
        (status = 403, description = "User account is inactive", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let invalid = || ApiError::unauthorized("Invalid or expired refresh token", "INVALID_REFRESH_TOKEN");

    let claims = state
        .jwt_config
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|_| invalid())?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let (user_id, session_id) = take_stored_token(&mut conn, &payload.refresh_token)
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| {
            warn!(sub = %claims.sub, "Refresh token not found or expired");
            invalid()
        })?;

    if claims.sub != user_id.to_string() || claims.sid != session_id.to_string() {
        warn!(claimed = %claims.sub, stored = %user_id, "Refresh token mismatch");
        return Err(invalid());
    }

    match state.sessions.get(session_id).await {
        Ok(Some(session)) if session.user_id == user_id => {}
        Ok(_) => {
            record_auth_attempt("refresh", AuthOutcome::SessionExpired);
            return Err(ApiError::unauthorized("Session has ended", "SESSION_EXPIRED"));
        }
        Err(e) => {
            error!(error = %e, "Session lookup failed");
            return Err(ApiError::unavailable(
                "Session store unavailable",
                "SESSION_STORE_ERROR",
            ));
        }
    }

    let user: User = users::table
        .find(user_id)
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;

    if !user.is_active {
        return Err(ApiError::forbidden("User account is inactive", "ACCOUNT_INACTIVE"));
    }

    let (access_token, refresh_token) = generate_tokens(&state, &mut conn, &user, session_id)?;

    info!(user_id = %user.id, "Tokens refreshed");
    Ok(Json(RefreshResponse {
        access_token,
        refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Authentication",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    request_id: RequestId,
) -> ApiResult<StatusCode> {
    state.sessions.delete(auth.session_id).await.map_err(|e| {
        error!(error = %e, "Failed to delete session");
        ApiError::unavailable("Session store unavailable", "SESSION_STORE_ERROR")
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted = diesel::delete(
        refresh_tokens::table.filter(refresh_tokens::session_id.eq(auth.session_id)),
    )
    .execute(&mut conn)
    .map_err(|_| ApiError::db_error())?;

    if let Err(e) = OutboxService::emit(
        &mut conn,
        EventType::LogoutCompleted,
        AggregateType::User,
        auth.user_id,
        &serde_json::json!({ "session_id": auth.session_id }),
        EventMetadata::new()
            .with_user(auth.user_id)
            .with_request_id(request_id.to_metadata()),
    ) {
        warn!(error = %e, "Failed to record logout event");
    }

    info!(user_id = %auth.user_id, tokens_deleted = deleted, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(session): Extension<SessionRecord>,
) -> ApiResult<Json<CurrentUserResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .find(auth.user_id)
        .select(User::as_select())
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    let profile = membership::load_profile(&mut conn, user.id).map_err(DomainError::from)?;
    let names = membership::accessible_companies(&mut conn, &profile).map_err(DomainError::from)?;

    let memberships = profile
        .memberships
        .iter()
        .filter_map(|m| {
            names.iter().find(|c| c.id == m.company_id).map(|c| MembershipResponse {
                company_id: c.id,
                company_name: c.name.clone(),
                role: m.role.label().to_string(),
            })
        })
        .collect();

    Ok(Json(CurrentUserResponse {
        global_role: profile.global_role.map(|r| r.label().to_string()),
        current_company: session.current_company().cloned(),
        memberships,
        user: user.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    tag = "Authentication",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or already used token", body = ApiError)
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let user = verify(&mut conn, payload.token)?;

    // Pending access became active; live sessions must pick it up.
    if let Err(e) = state.sessions.flag_user_refresh(user.id).await {
        warn!(error = %e, user_id = %user.id, "Failed to flag sessions after verification");
    }

    Ok(Json(MessageResponse {
        message: "Email verified".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/complete-registration",
    tag = "Authentication",
    request_body = CompleteRegistrationRequest,
    responses(
        (status = 200, description = "Registration completed and logged in", body = AuthResponse),
        (status = 400, description = "Invalid token or password", body = ApiError),
        (status = 409, description = "Registration already completed", body = ApiError)
    )
)]
pub async fn complete_registration(
    State(state): State<AppState>,
    Json(payload): Json<CompleteRegistrationRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let password_hash = hash_password(&state, &payload.password)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = finish_registration(&mut conn, payload.token, &password_hash, payload.full_name)?;

    let (access_token, refresh_token, current_company) =
        start_session(&state, &mut conn, &user).await?;

    record_auth_attempt("complete_registration", AuthOutcome::Success);
    Ok(Json(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
        current_company,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_is_stable_hex() {
        let a = hash_token("refresh-token");
        assert_eq!(a, hash_token("refresh-token"));
        assert_ne!(a, hash_token("other"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            email: "owner@acme.test".to_string(),
            password: "x".to_string(),
            full_name: None,
            company_name: Some("Acme".to_string()),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            email: "not-an-email".to_string(),
            ..ok
        };
        assert!(bad.validate().is_err());
    }
}
