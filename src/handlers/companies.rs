//! Company listing, creation, switching and settings.

use axum::{extract::State, http::StatusCode, Extension, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{get_db_conn, ApiError, ApiResult, DomainError},
    events::{AggregateType, EventMetadata, EventType, OutboxService},
    middleware::{AuthUser, RequestId, TenantContext},
    models::{Company, CompanyChanges, NewCompany},
    schema::companies,
    tenancy::{context, membership, CompanySnapshot, SessionRecord},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CompanySummary {
    pub id: i32,
    #[schema(example = "Acme Properties")]
    pub name: String,
    /// Role label, absent for global-role users without a membership.
    #[schema(example = "Company Owner")]
    pub role: Option<String>,
    pub is_current: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty"))]
    #[schema(example = "Acme Lettings")]
    pub name: String,
    pub trading_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub business_email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SwitchCompanyRequest {
    #[schema(example = 5)]
    pub company_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty"))]
    pub name: Option<String>,
    pub trading_name: Option<String>,
    pub registration_number: Option<String>,
    pub tax_number: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub business_email: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub support_email: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub accounts_email: Option<String>,
    pub phone: Option<String>,
    #[validate(url(message = "Invalid URL"))]
    pub website: Option<String>,
}

impl UpdateCompanyRequest {
    fn into_changes(self) -> CompanyChanges {
        CompanyChanges {
            name: self.name,
            trading_name: self.trading_name,
            registration_number: self.registration_number,
            tax_number: self.tax_number,
            business_email: self.business_email,
            support_email: self.support_email,
            accounts_email: self.accounts_email,
            phone: self.phone,
            website: self.website,
            updated_at: Some(chrono::Utc::now().naive_utc()),
        }
    }
}

fn validation_error(e: validator::ValidationErrors) -> (StatusCode, Json<ApiError>) {
    let field = e.field_errors().keys().next().map(|k| k.to_string());
    ApiError::unprocessable(format!("Validation error: {}", e), "VALIDATION_ERROR", field)
}

#[utoipa::path(
    get,
    path = "/companies",
    tag = "Companies",
    responses(
        (status = 200, description = "Companies reachable by the caller", body = Vec<CompanySummary>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_companies(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(session): Extension<SessionRecord>,
) -> ApiResult<Json<Vec<CompanySummary>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let profile = membership::load_profile(&mut conn, auth.user_id).map_err(DomainError::from)?;
    let accessible =
        membership::accessible_companies(&mut conn, &profile).map_err(DomainError::from)?;

    let current = session.current_company().map(|c| c.id);
    let data = accessible
        .into_iter()
        .map(|c| CompanySummary {
            role: profile.role_in(c.id).map(|r| r.label().to_string()),
            is_current: current == Some(c.id),
            id: c.id,
            name: c.name,
        })
        .collect();

    Ok(Json(data))
}

#[utoipa::path(
    post,
    path = "/companies",
    tag = "Companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created with the caller as owner", body = Company),
        (status = 422, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    request_id: RequestId,
    Json(payload): Json<CreateCompanyRequest>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    payload.validate().map_err(validation_error)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let company = conn.transaction::<_, DomainError, _>(|conn| {
        let company = membership::create_company_with_owner(
            conn,
            auth.user_id,
            &NewCompany {
                name: payload.name.trim().to_string(),
                trading_name: payload.trading_name,
                business_email: payload.business_email,
                phone: payload.phone,
            },
        )?;

        OutboxService::emit(
            conn,
            EventType::CompanyCreated,
            AggregateType::Company,
            company.id,
            &serde_json::json!({ "name": company.name, "owner_id": auth.user_id }),
            EventMetadata::new()
                .with_user(auth.user_id)
                .with_company(company.id)
                .with_request_id(request_id.to_metadata()),
        )?;
        Ok(company)
    })?;

    info!(company_id = company.id, owner = %auth.user_id, "Company created");
    Ok((StatusCode::CREATED, Json(company)))
}

#[utoipa::path(
    post,
    path = "/companies/switch",
    tag = "Companies",
    request_body = SwitchCompanyRequest,
    responses(
        (status = 200, description = "Current company changed", body = CompanySnapshot),
        (status = 403, description = "No access to that company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn switch_company(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Extension(mut session): Extension<SessionRecord>,
    Json(payload): Json<SwitchCompanyRequest>,
) -> ApiResult<Json<CompanySnapshot>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let profile = membership::load_profile(&mut conn, auth.user_id).map_err(DomainError::from)?;
    let accessible =
        membership::accessible_companies(&mut conn, &profile).map_err(DomainError::from)?;

    let chosen = context::switch_company(&mut session, payload.company_id, &accessible)?;

    state
        .sessions
        .put(auth.session_id, &session)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to persist session");
            ApiError::unavailable("Session store unavailable", "SESSION_STORE_ERROR")
        })?;

    info!(user_id = %auth.user_id, company_id = chosen.id, "Current company switched");
    Ok(Json(chosen))
}

#[utoipa::path(
    get,
    path = "/company",
    tag = "Companies",
    responses(
        (status = 200, description = "Current company settings", body = Company),
        (status = 403, description = "User is not associated with any company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_company(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Json<Company>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let company = companies::table
        .find(tenant.company_id())
        .select(Company::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?
        .ok_or(DomainError::NotFound("Company"))?;
    Ok(Json(company))
}

#[utoipa::path(
    put,
    path = "/company",
    tag = "Companies",
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = Company),
        (status = 403, description = "Only a Company Owner may change settings", body = ApiError),
        (status = 422, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_current_company(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    request_id: RequestId,
    Json(payload): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<Company>> {
    let company_id = tenant.company_id();
    if !tenant.profile.can_manage_company(company_id) {
        return Err(
            DomainError::forbidden("Only a Company Owner may change company settings.").into(),
        );
    }
    payload.validate().map_err(validation_error)?;

    let changes = payload.into_changes();
    let mut conn = get_db_conn(&state.db_pool)?;

    let company = conn.transaction::<_, DomainError, _>(|conn| {
        let company: Company = diesel::update(companies::table.find(company_id))
            .set(&changes)
            .returning(Company::as_returning())
            .get_result(conn)?;

        OutboxService::emit(
            conn,
            EventType::CompanyUpdated,
            AggregateType::Company,
            company.id,
            &serde_json::json!({ "name": company.name }),
            EventMetadata::new()
                .with_user(tenant.profile.user_id)
                .with_company(company.id)
                .with_request_id(request_id.to_metadata()),
        )?;
        Ok(company)
    })?;

    info!(company_id, user_id = %tenant.profile.user_id, "Company settings updated");
    Ok(Json(company))
}
