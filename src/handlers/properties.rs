//! Estates, buildings, units and sub-units of the current company.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{get_db_conn, ApiError, ApiResult, DomainError},
    middleware::TenantContext,
    models::{Building, Estate, SubUnit, Unit},
    pagination::{PaginatedResponse, PaginationParams},
    properties::{hierarchy, BuildingType, EstateType, SubUnitType, TargetKind, TargetRef, UnitType},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEstateRequest {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Riverside Estate")]
    pub name: String,
    pub estate_type: EstateType,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBuildingRequest {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Block A")]
    pub name: String,
    pub building_type: BuildingType,
    pub estate_id: Option<i32>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUnitRequest {
    pub building_id: i32,
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "12B")]
    pub number: String,
    pub unit_type: UnitType,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSubUnitRequest {
    pub unit_id: i32,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Back room")]
    pub name: String,
    pub sub_unit_type: SubUnitType,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BuildingCreated {
    pub building: Building,
    /// The house unit created together with a single-unit building.
    pub unit: Option<Unit>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ParentFilter {
    /// Restrict to children of this parent (estate, building or unit).
    pub parent_id: Option<i32>,
}

fn require_editor(tenant: &TenantContext) -> Result<(), DomainError> {
    if tenant.profile.can_edit_properties(tenant.company_id()) {
        Ok(())
    } else {
        Err(DomainError::forbidden(
            "You do not have permission to change properties of this company.",
        ))
    }
}

fn check<T: Validate>(payload: &T) -> ApiResult<()> {
    payload.validate().map_err(|e| {
        let field = e.field_errors().keys().next().map(|k| k.to_string());
        ApiError::unprocessable(format!("Validation error: {}", e), "VALIDATION_ERROR", field)
    })
}

#[utoipa::path(
    post,
    path = "/estates",
    tag = "Properties",
    request_body = CreateEstateRequest,
    responses(
        (status = 201, description = "Estate created", body = Estate),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 422, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_estate(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(payload): Json<CreateEstateRequest>,
) -> ApiResult<(StatusCode, Json<Estate>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let estate = hierarchy::create_estate(
        &mut conn,
        tenant.company_id(),
        payload.name,
        payload.estate_type,
        payload.address,
    )?;
    Ok((StatusCode::CREATED, Json(estate)))
}

#[utoipa::path(
    get,
    path = "/estates",
    tag = "Properties",
    params(PaginationParams),
    responses((status = 200, description = "Estates of the current company", body = PaginatedResponse<Estate>)),
    security(("bearer_auth" = []))
)]
pub async fn list_estates(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Estate>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (rows, total) = hierarchy::list_estates(&mut conn, tenant.company_id(), &pagination)
        .map_err(DomainError::from)?;
    Ok(Json(PaginatedResponse::from_params(rows, &pagination, total)))
}

#[utoipa::path(
    get,
    path = "/estates/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Estate id")),
    responses(
        (status = 200, description = "Estate", body = Estate),
        (status = 403, description = "Belongs to another company", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_estate(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Estate>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(hierarchy::get_estate(&mut conn, tenant.company_id(), id)?))
}

#[utoipa::path(
    post,
    path = "/buildings",
    tag = "Properties",
    request_body = CreateBuildingRequest,
    responses(
        (status = 201, description = "Building created", body = BuildingCreated),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 422, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_building(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(payload): Json<CreateBuildingRequest>,
) -> ApiResult<(StatusCode, Json<BuildingCreated>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let (building, unit) = hierarchy::create_building(
        &mut conn,
        tenant.company_id(),
        payload.estate_id,
        payload.name,
        payload.building_type,
        payload.address,
    )?;
    Ok((StatusCode::CREATED, Json(BuildingCreated { building, unit })))
}

#[utoipa::path(
    get,
    path = "/buildings",
    tag = "Properties",
    params(PaginationParams, ParentFilter),
    responses((status = 200, description = "Buildings, optionally of one estate", body = PaginatedResponse<Building>)),
    security(("bearer_auth" = []))
)]
pub async fn list_buildings(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ParentFilter>,
) -> ApiResult<Json<PaginatedResponse<Building>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (rows, total) =
        hierarchy::list_buildings(&mut conn, tenant.company_id(), filter.parent_id, &pagination)
            .map_err(DomainError::from)?;
    Ok(Json(PaginatedResponse::from_params(rows, &pagination, total)))
}

#[utoipa::path(
    get,
    path = "/buildings/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Building id")),
    responses(
        (status = 200, description = "Building", body = Building),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_building(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Building>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(hierarchy::get_building(&mut conn, tenant.company_id(), id)?))
}

#[utoipa::path(
    post,
    path = "/units",
    tag = "Properties",
    request_body = CreateUnitRequest,
    responses(
        (status = 201, description = "Unit created", body = Unit),
        (status = 422, description = "Rejected by the building's unit rules", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_unit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(payload): Json<CreateUnitRequest>,
) -> ApiResult<(StatusCode, Json<Unit>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let unit = hierarchy::create_unit(
        &mut conn,
        tenant.company_id(),
        payload.building_id,
        payload.number.trim().to_string(),
        payload.unit_type,
    )?;
    Ok((StatusCode::CREATED, Json(unit)))
}

#[utoipa::path(
    get,
    path = "/units",
    tag = "Properties",
    params(PaginationParams, ParentFilter),
    responses((status = 200, description = "Units, optionally of one building", body = PaginatedResponse<Unit>)),
    security(("bearer_auth" = []))
)]
pub async fn list_units(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ParentFilter>,
) -> ApiResult<Json<PaginatedResponse<Unit>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (rows, total) =
        hierarchy::list_units(&mut conn, tenant.company_id(), filter.parent_id, &pagination)
            .map_err(DomainError::from)?;
    Ok(Json(PaginatedResponse::from_params(rows, &pagination, total)))
}

#[utoipa::path(
    get,
    path = "/units/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Unit id")),
    responses(
        (status = 200, description = "Unit", body = Unit),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_unit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Unit>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(hierarchy::get_unit(&mut conn, tenant.company_id(), id)?))
}

#[utoipa::path(
    post,
    path = "/subunits",
    tag = "Properties",
    request_body = CreateSubUnitRequest,
    responses(
        (status = 201, description = "Sub-unit created", body = SubUnit),
        (status = 422, description = "Validation error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_sub_unit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(payload): Json<CreateSubUnitRequest>,
) -> ApiResult<(StatusCode, Json<SubUnit>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let sub_unit = hierarchy::create_sub_unit(
        &mut conn,
        tenant.company_id(),
        payload.unit_id,
        payload.name,
        payload.sub_unit_type,
    )?;
    Ok((StatusCode::CREATED, Json(sub_unit)))
}

#[utoipa::path(
    get,
    path = "/subunits",
    tag = "Properties",
    params(PaginationParams, ParentFilter),
    responses((status = 200, description = "Sub-units, optionally of one unit", body = PaginatedResponse<SubUnit>)),
    security(("bearer_auth" = []))
)]
pub async fn list_sub_units(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ParentFilter>,
) -> ApiResult<Json<PaginatedResponse<SubUnit>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (rows, total) =
        hierarchy::list_sub_units(&mut conn, tenant.company_id(), filter.parent_id, &pagination)
            .map_err(DomainError::from)?;
    Ok(Json(PaginatedResponse::from_params(rows, &pagination, total)))
}

#[utoipa::path(
    get,
    path = "/subunits/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Sub-unit id")),
    responses(
        (status = 200, description = "Sub-unit", body = SubUnit),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_sub_unit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SubUnit>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(hierarchy::get_sub_unit(&mut conn, tenant.company_id(), id)?))
}

/// Deletes a property with its descendants and every attached image.
async fn delete_target(state: &AppState, tenant: &TenantContext, target: TargetRef) -> ApiResult<StatusCode> {
    require_editor(tenant)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let paths = hierarchy::delete_property(&mut conn, tenant.company_id(), target)?;
    state.images.remove_objects(&paths).await;

    info!(kind = %target.kind, id = target.id, images_removed = paths.len(), "Property deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/estates/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Estate id")),
    responses(
        (status = 204, description = "Deleted with descendants and images"),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_estate(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    delete_target(&state, &tenant, TargetRef::new(TargetKind::Estate, id)).await
}

#[utoipa::path(
    delete,
    path = "/buildings/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Building id")),
    responses(
        (status = 204, description = "Deleted with descendants and images"),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_building(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    delete_target(&state, &tenant, TargetRef::new(TargetKind::Building, id)).await
}

#[utoipa::path(
    delete,
    path = "/units/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Unit id")),
    responses(
        (status = 204, description = "Deleted with descendants and images"),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_unit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    delete_target(&state, &tenant, TargetRef::new(TargetKind::Unit, id)).await
}

#[utoipa::path(
    delete,
    path = "/subunits/{id}",
    tag = "Properties",
    params(("id" = i32, Path, description = "Sub-unit id")),
    responses(
        (status = 204, description = "Deleted with descendants and images"),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_sub_unit(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<StatusCode> {
    delete_target(&state, &tenant, TargetRef::new(TargetKind::SubUnit, id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_vocabulary_deserializes_from_json() {
        let req: CreateBuildingRequest = serde_json::from_value(serde_json::json!({
            "name": "Cottage",
            "building_type": "single_unit"
        }))
        .unwrap();
        assert_eq!(req.building_type, BuildingType::SingleUnit);
        assert!(req.estate_id.is_none());

        let bad = serde_json::from_value::<CreateUnitRequest>(serde_json::json!({
            "building_id": 1,
            "number": "1",
            "unit_type": "garage"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_blank_unit_number_is_rejected() {
        let req = CreateUnitRequest {
            building_id: 1,
            number: String::new(),
            unit_type: UnitType::Apartment,
        };
        let (status, Json(body)) = check(&req).unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.field.as_deref(), Some("number"));
    }
}
