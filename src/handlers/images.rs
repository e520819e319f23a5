//! Image upload and management for estates, buildings, units and sub-units.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    error::{get_db_conn, ApiError, ApiResult, DomainError},
    images::{manager, ImageService, UploadRequest},
    middleware::TenantContext,
    models::PropertyImage,
    properties::{TargetKind, TargetRef},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageResponse {
    pub id: i32,
    #[schema(example = "unit")]
    pub target_kind: String,
    pub target_id: i32,
    #[schema(example = "/media/companies/1/units/3/20240115103000-1a2b3c4d.jpg")]
    pub url: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
    #[schema(example = "image/jpeg")]
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: NaiveDateTime,
}

impl ImageResponse {
    fn new(images: &ImageService, image: PropertyImage) -> Self {
        Self {
            url: images.public_url(&image),
            id: image.id,
            target_kind: image.target_kind,
            target_id: image.target_id,
            caption: image.caption,
            is_primary: image.is_primary,
            display_order: image.display_order,
            content_type: image.content_type,
            size_bytes: image.size_bytes,
            created_at: image.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteImageResponse {
    pub deleted_id: i32,
    /// The sibling that became primary because the deleted image was.
    pub promoted: Option<ImageResponse>,
}

/// Multipart form accepted by the upload endpoint.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub caption: Option<String>,
    pub is_primary: Option<bool>,
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateImageRequest {
    /// `null` clears the caption, absence leaves it unchanged.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub caption: Option<Option<String>>,
    pub order: Option<i32>,
}

fn present<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

fn require_editor(tenant: &TenantContext) -> Result<(), DomainError> {
    if tenant.profile.can_edit_properties(tenant.company_id()) {
        Ok(())
    } else {
        Err(DomainError::forbidden(
            "You do not have permission to manage images of this company.",
        ))
    }
}

fn target_from_path(kind: &str, id: i32) -> Result<TargetRef, DomainError> {
    Ok(TargetRef::new(kind.parse::<TargetKind>()?, id))
}

fn multipart_error(e: MultipartError) -> (StatusCode, Json<ApiError>) {
    ApiError::bad_request(e.body_text(), "INVALID_MULTIPART")
}

fn parse_flag(raw: &str) -> Result<bool, DomainError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(DomainError::validation("is_primary", "Expected a boolean.")),
    }
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<UploadRequest> {
    let mut file = None;
    let mut caption = None;
    let mut is_primary = false;
    let mut display_order = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((bytes, content_type));
            }
            "caption" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                caption = (!text.is_empty()).then(|| text.to_string());
            }
            "is_primary" => {
                let text = field.text().await.map_err(multipart_error)?;
                is_primary = parse_flag(&text)?;
            }
            "order" | "display_order" => {
                let text = field.text().await.map_err(multipart_error)?;
                let order = text.trim().parse::<i32>().map_err(|_| {
                    DomainError::validation("order", "Display order must be an integer.")
                })?;
                display_order = Some(order);
            }
            _ => {}
        }
    }

    let (bytes, content_type) =
        file.ok_or_else(|| DomainError::validation("file", "An image file is required."))?;

    Ok(UploadRequest {
        bytes,
        content_type,
        caption,
        is_primary,
        display_order,
    })
}

#[utoipa::path(
    post,
    path = "/properties/{kind}/{id}/images",
    tag = "Images",
    params(
        ("kind" = String, Path, description = "estate, building, unit or subunit"),
        ("id" = i32, Path, description = "Property id")
    ),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Image stored", body = ImageResponse),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Property not found", body = ApiError),
        (status = 422, description = "Invalid file or image limit reached", body = ApiError),
        (status = 503, description = "Storage unavailable", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path((kind, id)): Path<(String, i32)>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ImageResponse>)> {
    require_editor(&tenant)?;
    let target = target_from_path(&kind, id)?;
    let upload = read_upload(multipart).await?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let image = state
        .images
        .upload(&mut conn, tenant.company_id(), target, upload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ImageResponse::new(&state.images, image)),
    ))
}

#[utoipa::path(
    get,
    path = "/properties/{kind}/{id}/images",
    tag = "Images",
    params(
        ("kind" = String, Path, description = "estate, building, unit or subunit"),
        ("id" = i32, Path, description = "Property id")
    ),
    responses(
        (status = 200, description = "Images ordered by display order", body = Vec<ImageResponse>),
        (status = 404, description = "Property not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_images(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path((kind, id)): Path<(String, i32)>,
) -> ApiResult<Json<Vec<ImageResponse>>> {
    let target = target_from_path(&kind, id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let images = manager::list_images(&mut conn, tenant.company_id(), target)?;

    Ok(Json(
        images
            .into_iter()
            .map(|image| ImageResponse::new(&state.images, image))
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/images/{id}/primary",
    tag = "Images",
    params(("id" = i32, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image is now the primary of its property", body = ImageResponse),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Image not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_primary_image(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<Json<ImageResponse>> {
    require_editor(&tenant)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let image = state.images.set_primary(&mut conn, tenant.company_id(), id)?;
    Ok(Json(ImageResponse::new(&state.images, image)))
}

#[utoipa::path(
    patch,
    path = "/images/{id}",
    tag = "Images",
    params(("id" = i32, Path, description = "Image id")),
    request_body = UpdateImageRequest,
    responses(
        (status = 200, description = "Caption or order updated", body = ImageResponse),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Image not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_image(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateImageRequest>,
) -> ApiResult<Json<ImageResponse>> {
    require_editor(&tenant)?;
    let caption = payload
        .caption
        .map(|c| c.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));

    let mut conn = get_db_conn(&state.db_pool)?;
    let image = manager::update_image(&mut conn, tenant.company_id(), id, caption, payload.order)?;
    Ok(Json(ImageResponse::new(&state.images, image)))
}

#[utoipa::path(
    delete,
    path = "/images/{id}",
    tag = "Images",
    params(("id" = i32, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image deleted", body = DeleteImageResponse),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Image not found", body = ApiError),
        (status = 503, description = "Storage unavailable", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<i32>,
) -> ApiResult<Json<DeleteImageResponse>> {
    require_editor(&tenant)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted = state.images.delete(&mut conn, tenant.company_id(), id).await?;

    if let Some(promoted) = &deleted.promoted {
        info!(image_id = id, promoted_id = promoted.id, "Primary image promoted after delete");
    }

    Ok(Json(DeleteImageResponse {
        deleted_id: deleted.image.id,
        promoted: deleted
            .promoted
            .map(|image| ImageResponse::new(&state.images, image)),
    }))
}
