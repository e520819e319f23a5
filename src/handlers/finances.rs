//! Financial categories, transactions, purchases and recurring templates of
//! the current company.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{get_db_conn, ApiError, ApiResult, DomainError},
    finances::{
        self,
        purchases::{self, PurchaseCosts, PurchaseTotals, PurchaseType},
        recurring::{self, Frequency},
        transactions, EntryType,
    },
    middleware::{AuthUser, TenantContext},
    models::{FinancialCategory, FinancialTransaction, PropertyPurchase, RecurringTransaction},
    pagination::{PaginatedResponse, PaginationParams},
    properties::{TargetKind, TargetRef},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255, message = "Name must not be empty"))]
    #[schema(example = "Rent")]
    pub name: String,
    pub category_type: EntryType,
    pub description: Option<String>,
    #[serde(default)]
    pub is_tax_deductible: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryFilter {
    /// `income` or `expense`.
    #[serde(rename = "type")]
    pub category_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionRequest {
    pub category_id: i32,
    pub transaction_type: EntryType,
    pub target_kind: TargetKind,
    pub target_id: i32,
    /// Amount in minor currency units.
    #[validate(range(min = 0, message = "Amount cannot be negative"))]
    #[schema(example = 1250000)]
    pub amount_cents: i64,
    #[schema(example = "2024-03-01")]
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TargetFilter {
    /// estate, building or unit. Requires `target_id`.
    pub target_kind: Option<String>,
    pub target_id: Option<i32>,
}

impl TargetFilter {
    fn target(&self) -> Result<Option<TargetRef>, DomainError> {
        match (&self.target_kind, self.target_id) {
            (None, None) => Ok(None),
            (Some(kind), Some(id)) => Ok(Some(TargetRef::new(kind.parse()?, id))),
            _ => Err(DomainError::BadRequest(
                "target_kind and target_id must be given together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePurchaseRequest {
    pub target_kind: TargetKind,
    pub target_id: i32,
    #[schema(example = "2023-11-15")]
    pub purchase_date: NaiveDate,
    #[serde(default)]
    pub purchase_type: PurchaseType,
    #[schema(example = 185000000)]
    pub purchase_price_cents: i64,
    #[serde(default)]
    pub transfer_duty_cents: i64,
    #[serde(default)]
    pub is_vat_applicable: bool,
    #[serde(default)]
    pub vat_cents: i64,
    #[serde(default)]
    pub transfer_cost_cents: i64,
    #[serde(default)]
    pub conveyancing_fees_cents: i64,
    #[serde(default)]
    pub deeds_office_fees_cents: i64,
    #[serde(default)]
    pub down_payment_cents: i64,
    #[serde(default)]
    pub financing_cents: i64,
    #[serde(default)]
    pub bond_registration_cents: i64,
    #[serde(default)]
    pub bond_initiation_cents: i64,
    /// Rates and levy clearance certificates.
    #[serde(default)]
    pub clearance_cents: i64,
    #[serde(default)]
    pub initial_repairs_cents: i64,
    pub notes: Option<String>,
}

impl CreatePurchaseRequest {
    fn costs(&self) -> PurchaseCosts {
        PurchaseCosts {
            purchase_price: self.purchase_price_cents,
            transfer_duty: self.transfer_duty_cents,
            is_vat_applicable: self.is_vat_applicable,
            vat: self.vat_cents,
            transfer_cost: self.transfer_cost_cents,
            conveyancing_fees: self.conveyancing_fees_cents,
            deeds_office_fees: self.deeds_office_fees_cents,
            down_payment: self.down_payment_cents,
            financing: self.financing_cents,
            bond_registration: self.bond_registration_cents,
            bond_initiation: self.bond_initiation_cents,
            clearance: self.clearance_cents,
            initial_repairs: self.initial_repairs_cents,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseResponse {
    #[serde(flatten)]
    pub purchase: PropertyPurchase,
    pub totals: PurchaseTotals,
}

impl From<PropertyPurchase> for PurchaseResponse {
    fn from(purchase: PropertyPurchase) -> Self {
        let totals = purchase.totals();
        Self { purchase, totals }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRecurringRequest {
    pub category_id: i32,
    pub transaction_type: EntryType,
    pub target_kind: TargetKind,
    pub target_id: i32,
    #[validate(range(min = 0, message = "Amount cannot be negative"))]
    #[schema(example = 950000)]
    pub amount_cents: i64,
    pub frequency: Frequency,
    #[schema(example = "2024-03-01")]
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedTransaction {
    pub transaction: FinancialTransaction,
    pub recurring: RecurringTransaction,
}

fn require_editor(tenant: &TenantContext) -> Result<(), DomainError> {
    if tenant.profile.can_edit_properties(tenant.company_id()) {
        Ok(())
    } else {
        Err(DomainError::forbidden(
            "You do not have permission to record finances for this company.",
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
    path = "/finances/categories",
    tag = "Finances",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = FinancialCategory),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 422, description = "Duplicate or invalid category", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_category(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(payload): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<FinancialCategory>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let category = finances::create_category(
        &mut conn,
        tenant.company_id(),
        payload.name,
        payload.category_type,
        payload.description,
        payload.is_tax_deductible,
    )?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    get,
    path = "/finances/categories",
    tag = "Finances",
    params(CategoryFilter),
    responses(
        (status = 200, description = "Categories of the current company", body = Vec<FinancialCategory>),
        (status = 422, description = "Unknown category type", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(filter): Query<CategoryFilter>,
) -> ApiResult<Json<Vec<FinancialCategory>>> {
    let category_type = filter
        .category_type
        .as_deref()
        .map(|raw| {
            EntryType::parse(raw).ok_or_else(|| {
                DomainError::validation("type", "Expected 'income' or 'expense'.")
            })
        })
        .transpose()?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let categories = finances::list_categories(&mut conn, tenant.company_id(), category_type)
        .map_err(DomainError::from)?;
    Ok(Json(categories))
}

#[utoipa::path(
    post,
    path = "/finances/transactions",
    tag = "Finances",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction recorded", body = FinancialTransaction),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 422, description = "Category mismatch, unknown target or invalid amount", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateTransactionRequest>,
) -> ApiResult<(StatusCode, Json<FinancialTransaction>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let transaction = transactions::create_transaction(
        &mut conn,
        tenant.company_id(),
        auth.user_id,
        transactions::NewTransaction {
            category_id: payload.category_id,
            transaction_type: payload.transaction_type,
            target: TargetRef::new(payload.target_kind, payload.target_id),
            amount_cents: payload.amount_cents,
            transaction_date: payload.transaction_date,
            description: payload.description,
            is_paid: payload.is_paid,
        },
    )?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[utoipa::path(
    get,
    path = "/finances/transactions",
    tag = "Finances",
    params(TargetFilter, PaginationParams),
    responses(
        (status = 200, description = "Transactions, newest first", body = PaginatedResponse<FinancialTransaction>),
        (status = 400, description = "Incomplete target filter", body = ApiError),
        (status = 404, description = "Target not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(filter): Query<TargetFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<FinancialTransaction>>> {
    let target = filter.target()?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let (rows, total) =
        transactions::list_transactions(&mut conn, tenant.company_id(), target, &pagination)?;
    Ok(Json(PaginatedResponse::from_params(rows, &pagination, total)))
}

#[utoipa::path(
    post,
    path = "/finances/purchases",
    tag = "Finances",
    request_body = CreatePurchaseRequest,
    responses(
        (status = 201, description = "Purchase recorded", body = PurchaseResponse),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 422, description = "Duty and VAT both set, funding mismatch or unknown target", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_purchase(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreatePurchaseRequest>,
) -> ApiResult<(StatusCode, Json<PurchaseResponse>)> {
    require_editor(&tenant)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let purchase = purchases::create_purchase(
        &mut conn,
        tenant.company_id(),
        auth.user_id,
        purchases::NewPurchase {
            target: TargetRef::new(payload.target_kind, payload.target_id),
            purchase_date: payload.purchase_date,
            purchase_type: payload.purchase_type,
            costs: payload.costs(),
            notes: payload.notes,
        },
    )?;
    Ok((StatusCode::CREATED, Json(purchase.into())))
}

#[utoipa::path(
    get,
    path = "/finances/purchases",
    tag = "Finances",
    params(TargetFilter),
    responses(
        (status = 200, description = "Purchases, newest first", body = Vec<PurchaseResponse>),
        (status = 400, description = "Incomplete target filter", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_purchases(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(filter): Query<TargetFilter>,
) -> ApiResult<Json<Vec<PurchaseResponse>>> {
    let target = filter.target()?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let rows = purchases::list_purchases(&mut conn, tenant.company_id(), target)?;
    Ok(Json(rows.into_iter().map(PurchaseResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/finances/recurring",
    tag = "Finances",
    request_body = CreateRecurringRequest,
    responses(
        (status = 201, description = "Recurring template created", body = RecurringTransaction),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 422, description = "Category mismatch, bad dates or unknown target", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_recurring(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateRecurringRequest>,
) -> ApiResult<(StatusCode, Json<RecurringTransaction>)> {
    require_editor(&tenant)?;
    check(&payload)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let template = recurring::create_recurring(
        &mut conn,
        tenant.company_id(),
        auth.user_id,
        recurring::NewRecurring {
            category_id: payload.category_id,
            transaction_type: payload.transaction_type,
            target: TargetRef::new(payload.target_kind, payload.target_id),
            amount_cents: payload.amount_cents,
            frequency: payload.frequency,
            start_date: payload.start_date,
            end_date: payload.end_date,
            description: payload.description,
        },
    )?;
    Ok((StatusCode::CREATED, Json(template)))
}

#[utoipa::path(
    get,
    path = "/finances/recurring",
    tag = "Finances",
    responses(
        (status = 200, description = "Recurring templates by next due date", body = Vec<RecurringTransaction>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_recurring(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Json<Vec<RecurringTransaction>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let rows = recurring::list_recurring(&mut conn, tenant.company_id())
        .map_err(DomainError::from)?;
    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/finances/recurring/{id}/generate",
    tag = "Finances",
    params(("id" = i32, Path, description = "Recurring template id")),
    responses(
        (status = 201, description = "Next occurrence booked", body = GeneratedTransaction),
        (status = 403, description = "Not allowed", body = ApiError),
        (status = 404, description = "Template not found", body = ApiError),
        (status = 409, description = "Template is no longer active", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_recurring(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> ApiResult<(StatusCode, Json<GeneratedTransaction>)> {
    require_editor(&tenant)?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let (transaction, recurring) =
        recurring::generate_next(&mut conn, tenant.company_id(), auth.user_id, id)?;
    Ok((
        StatusCode::CREATED,
        Json(GeneratedTransaction {
            transaction,
            recurring,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_filter_requires_both_parts() {
        let none = TargetFilter {
            target_kind: None,
            target_id: None,
        };
        assert_eq!(none.target().unwrap(), None);

        let full = TargetFilter {
            target_kind: Some("buildings".to_string()),
            target_id: Some(3),
        };
        assert_eq!(
            full.target().unwrap(),
            Some(TargetRef::new(TargetKind::Building, 3))
        );

        let partial = TargetFilter {
            target_kind: Some("unit".to_string()),
            target_id: None,
        };
        assert!(matches!(partial.target(), Err(DomainError::BadRequest(_))));
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let req: CreateTransactionRequest = serde_json::from_value(serde_json::json!({
            "category_id": 1,
            "transaction_type": "expense",
            "target_kind": "unit",
            "target_id": 2,
            "amount_cents": -5,
            "transaction_date": "2024-03-01"
        }))
        .unwrap();
        let (status, Json(body)) = check(&req).unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.field.as_deref(), Some("amount_cents"));
    }

    #[test]
    fn test_purchase_request_defaults_optional_costs_to_zero() {
        let req: CreatePurchaseRequest = serde_json::from_value(serde_json::json!({
            "target_kind": "unit",
            "target_id": 4,
            "purchase_date": "2023-11-15",
            "purchase_price_cents": 100_000,
            "down_payment_cents": 100_000
        }))
        .unwrap();

        assert_eq!(req.purchase_type, PurchaseType::Business);
        let costs = req.costs();
        assert_eq!(costs.financing, 0);
        assert!(costs.validate().is_ok());
    }
}
