//! Company member management handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{get_db_conn, ApiError, ApiResult, DomainError},
    middleware::{RequestId, TenantContext},
    models::UserCompanyAccess,
    pagination::{PaginationMeta, PaginationParams},
    schema::users,
    tenancy::{
        access::{self, InviteOutcome, Invitation, MemberRow},
        Role,
    },
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InviteRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "new@x.com")]
    pub email: String,
    /// Role name or code, e.g. `company_user` or `cu`.
    #[schema(example = "company_user")]
    pub role: String,
    #[schema(example = "Sam Invitee")]
    pub full_name: Option<String>,
    /// Change the role of an existing member instead of rejecting.
    #[serde(default)]
    pub update_existing: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    #[schema(example = "company_owner")]
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub access_id: i32,
    pub user_id: Uuid,
    #[schema(example = "member@acme.test")]
    pub email: String,
    pub full_name: Option<String>,
    #[schema(example = "Company User")]
    pub role: String,
    #[schema(example = "cu")]
    pub role_code: String,
    #[schema(example = "active")]
    pub status: String,
    pub email_verified: bool,
}

impl MemberResponse {
    fn new(access: UserCompanyAccess, email: String, full_name: Option<String>, email_verified: bool) -> Self {
        let role = Role::from_code(&access.role)
            .map(|r| r.label().to_string())
            .unwrap_or_else(|| access.role.clone());
        Self {
            access_id: access.id,
            user_id: access.user_id,
            email,
            full_name,
            role,
            role_code: access.role,
            status: access.status,
            email_verified,
        }
    }
}

impl From<MemberRow> for MemberResponse {
    fn from(row: MemberRow) -> Self {
        Self::new(row.access, row.email, row.full_name, row.email_verified)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    #[schema(example = "created")]
    pub outcome: String,
    pub user_created: bool,
    pub member: MemberResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersListResponse {
    pub data: Vec<MemberResponse>,
    pub pagination: PaginationMeta,
}

fn parse_role(raw: &str) -> Result<Role, DomainError> {
    raw.parse::<Role>()
        .map_err(|msg| DomainError::validation("role", msg))
}

/// Live sessions of `user_id` recompute their current company on the next
/// request.
async fn flag_sessions(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.sessions.flag_user_refresh(user_id).await {
        warn!(error = %e, user_id = %user_id, "Failed to flag sessions for company refresh");
    }
}

#[utoipa::path(
    post,
    path = "/members/invite",
    tag = "Members",
    request_body = InviteRequest,
    responses(
        (status = 201, description = "Access created or reactivated", body = InviteResponse),
        (status = 200, description = "Existing member's role updated", body = InviteResponse),
        (status = 403, description = "Only a Company Owner may invite", body = ApiError),
        (status = 409, description = "User already has access", body = ApiError),
        (status = 422, description = "Invalid email or role", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    request_id: RequestId,
    Json(payload): Json<InviteRequest>,
) -> ApiResult<(StatusCode, Json<InviteResponse>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::unprocessable(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
            Some("email".to_string()),
        ));
    }
    let role = parse_role(&payload.role)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let result = access::invite(
        &mut conn,
        &tenant.profile,
        tenant.company_id(),
        Invitation {
            email: payload.email,
            role,
            full_name: payload.full_name,
            update_existing: payload.update_existing,
        },
        request_id.to_metadata(),
    )?;

    flag_sessions(&state, result.user.id).await;

    let (status, outcome) = match result.outcome {
        InviteOutcome::Created => (StatusCode::CREATED, "created"),
        InviteOutcome::Reactivated => (StatusCode::CREATED, "reactivated"),
        InviteOutcome::RoleUpdated => (StatusCode::OK, "role_updated"),
    };

    Ok((
        status,
        Json(InviteResponse {
            outcome: outcome.to_string(),
            user_created: result.user_created,
            member: MemberResponse::new(
                result.access,
                result.user.email,
                result.user.full_name,
                result.user.email_verified,
            ),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/members",
    tag = "Members",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of company members", body = MembersListResponse),
        (status = 403, description = "User is not associated with any company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<MembersListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (rows, total) = access::list_members(&mut conn, tenant.company_id(), &pagination)
        .map_err(DomainError::from)?;

    Ok(Json(MembersListResponse {
        data: rows.into_iter().map(MemberResponse::from).collect(),
        pagination: PaginationMeta::for_params(&pagination, total),
    }))
}

#[utoipa::path(
    put,
    path = "/members/{access_id}/role",
    tag = "Members",
    params(("access_id" = i32, Path, description = "Access row id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = MemberResponse),
        (status = 403, description = "Not allowed to manage members", body = ApiError),
        (status = 404, description = "Access not found", body = ApiError),
        (status = 422, description = "Invalid role", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_member_role(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    request_id: RequestId,
    Path(access_id): Path<i32>,
    Json(payload): Json<ChangeRoleRequest>,
) -> ApiResult<Json<MemberResponse>> {
    let role = parse_role(&payload.role)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let updated = access::change_role(
        &mut conn,
        &tenant.profile,
        tenant.company_id(),
        access_id,
        role,
        request_id.to_metadata(),
    )?;

    flag_sessions(&state, updated.user_id).await;

    let (email, full_name, email_verified): (String, Option<String>, bool) = users::table
        .find(updated.user_id)
        .select((users::email, users::full_name, users::email_verified))
        .first(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(MemberResponse::new(updated, email, full_name, email_verified)))
}

#[utoipa::path(
    delete,
    path = "/members/{access_id}",
    tag = "Members",
    params(("access_id" = i32, Path, description = "Access row id")),
    responses(
        (status = 204, description = "Access revoked"),
        (status = 403, description = "Not allowed to manage members", body = ApiError),
        (status = 404, description = "Access not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    request_id: RequestId,
    Path(access_id): Path<i32>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let revoked = access::remove_access(
        &mut conn,
        &tenant.profile,
        tenant.company_id(),
        access_id,
        request_id.to_metadata(),
    )?;

    flag_sessions(&state, revoked.user_id).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_accepts_codes_and_names() {
        assert_eq!(parse_role("cu").unwrap(), Role::CompanyUser);
        assert_eq!(parse_role("Company Owner").unwrap(), Role::CompanyOwner);
        assert!(matches!(
            parse_role("landlord"),
            Err(DomainError::Validation {
                field: Some("role"),
                ..
            })
        ));
    }
}
