//! OpenAPI documentation configuration.
//!
//! Generates the OpenAPI specification for the EstateHub API with `utoipa`
//! and serves it through Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::handlers::auth::{
    AuthResponse, CompleteRegistrationRequest, CurrentUserResponse, LoginRequest,
    MembershipResponse, MessageResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    UserResponse, VerifyEmailRequest,
};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "EstateHub API",
        version = "1.0.0",
        description = "Multi-tenant property management with company-scoped access control.\n\n\
        ## Authentication\n\
        1. Register or login to get an access token\n\
        2. Include the token in requests: `Authorization: Bearer <token>`\n\
        3. Use the refresh token to get new access tokens when expired\n\n\
        ## Current company\n\
        Every session carries a current company. Company-scoped endpoints (members, \
        properties, images, finances) act on it. Change it with `POST /companies/switch`; \
        send `X-Refresh-Company: true` to force it to be recomputed.",
        contact(
            name = "EstateHub API Support"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "User authentication and token management"),
        (name = "Companies", description = "Company listing, switching and settings"),
        (name = "Members", description = "Company member management"),
        (name = "Properties", description = "Estates, buildings, units and sub-units"),
        (name = "Images", description = "Property images"),
        (name = "Finances", description = "Financial categories and transactions")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,
        crate::handlers::health::storage_check,

        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::verify_email,
        crate::handlers::auth::complete_registration,

        crate::handlers::companies::list_companies,
        crate::handlers::companies::create_company,
        crate::handlers::companies::switch_company,
        crate::handlers::companies::get_current_company,
        crate::handlers::companies::update_current_company,

        crate::handlers::members::invite_member,
        crate::handlers::members::list_members,
        crate::handlers::members::change_member_role,
        crate::handlers::members::remove_member,

        crate::handlers::properties::create_estate,
        crate::handlers::properties::list_estates,
        crate::handlers::properties::get_estate,
        crate::handlers::properties::delete_estate,
        crate::handlers::properties::create_building,
        crate::handlers::properties::list_buildings,
        crate::handlers::properties::get_building,
        crate::handlers::properties::delete_building,
        crate::handlers::properties::create_unit,
        crate::handlers::properties::list_units,
        crate::handlers::properties::get_unit,
        crate::handlers::properties::delete_unit,
        crate::handlers::properties::create_sub_unit,
        crate::handlers::properties::list_sub_units,
        crate::handlers::properties::get_sub_unit,
        crate::handlers::properties::delete_sub_unit,

        crate::handlers::images::upload_image,
        crate::handlers::images::list_images,
        crate::handlers::images::set_primary_image,
        crate::handlers::images::update_image,
        crate::handlers::images::delete_image,

        crate::handlers::finances::create_category,
        crate::handlers::finances::list_categories,
        crate::handlers::finances::create_transaction,
        crate::handlers::finances::list_transactions,
        crate::handlers::finances::create_purchase,
        crate::handlers::finances::list_purchases,
        crate::handlers::finances::create_recurring,
        crate::handlers::finances::list_recurring,
        crate::handlers::finances::generate_recurring,
    ),
    components(
        schemas(
            ApiError,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            RefreshResponse,
            VerifyEmailRequest,
            CompleteRegistrationRequest,
            AuthResponse,
            UserResponse,
            MembershipResponse,
            CurrentUserResponse,
            MessageResponse,

            PaginationMeta,

            crate::models::Company,
            crate::tenancy::CompanySnapshot,
            crate::tenancy::Role,
            crate::handlers::companies::CompanySummary,
            crate::handlers::companies::CreateCompanyRequest,
            crate::handlers::companies::SwitchCompanyRequest,
            crate::handlers::companies::UpdateCompanyRequest,

            crate::handlers::members::InviteRequest,
            crate::handlers::members::InviteResponse,
            crate::handlers::members::ChangeRoleRequest,
            crate::handlers::members::MemberResponse,
            crate::handlers::members::MembersListResponse,

            crate::models::Estate,
            crate::models::Building,
            crate::models::Unit,
            crate::models::SubUnit,
            crate::properties::TargetKind,
            crate::properties::EstateType,
            crate::properties::BuildingType,
            crate::properties::UnitType,
            crate::properties::SubUnitType,
            crate::handlers::properties::CreateEstateRequest,
            crate::handlers::properties::CreateBuildingRequest,
            crate::handlers::properties::CreateUnitRequest,
            crate::handlers::properties::CreateSubUnitRequest,
            crate::handlers::properties::BuildingCreated,

            crate::handlers::images::ImageResponse,
            crate::handlers::images::DeleteImageResponse,
            crate::handlers::images::UploadForm,
            crate::handlers::images::UpdateImageRequest,

            crate::models::FinancialCategory,
            crate::models::FinancialTransaction,
            crate::finances::EntryType,
            crate::handlers::finances::CreateCategoryRequest,
            crate::handlers::finances::CreateTransactionRequest,
            crate::models::PropertyPurchase,
            crate::models::RecurringTransaction,
            crate::finances::purchases::PurchaseType,
            crate::finances::purchases::PurchaseTotals,
            crate::finances::recurring::Frequency,
            crate::handlers::finances::CreatePurchaseRequest,
            crate::handlers::finances::PurchaseResponse,
            crate::handlers::finances::CreateRecurringRequest,
            crate::handlers::finances::GeneratedTransaction,

            crate::storage::StorageStatus,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /auth/login or /auth/register.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
