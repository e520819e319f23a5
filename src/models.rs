use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Uuid,
    pub global_role: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub email_verified: bool,
    pub verification_token: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::companies)]
pub struct Company {
    #[schema(example = 5)]
    pub id: i32,
    #[schema(example = "Acme Properties")]
    pub name: String,
    pub trading_name: Option<String>,
    pub registration_number: Option<String>,
    pub tax_number: Option<String>,
    pub business_email: Option<String>,
    pub support_email: Option<String>,
    pub accounts_email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::companies)]
pub struct NewCompany {
    pub name: String,
    pub trading_name: Option<String>,
    pub business_email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::schema::companies)]
pub struct CompanyChanges {
    pub name: Option<String>,
    pub trading_name: Option<String>,
    pub registration_number: Option<String>,
    pub tax_number: Option<String>,
    pub business_email: Option<String>,
    pub support_email: Option<String>,
    pub accounts_email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::user_company_access)]
pub struct UserCompanyAccess {
    pub id: i32,
    pub user_id: Uuid,
    pub company_id: i32,
    pub role: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::user_company_access)]
pub struct NewUserCompanyAccess {
    pub user_id: Uuid,
    pub company_id: i32,
    pub role: String,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::estates)]
pub struct Estate {
    pub id: i32,
    pub company_id: i32,
    #[schema(example = "Riverside Estate")]
    pub name: String,
    #[schema(example = "residential")]
    pub estate_type: String,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::estates)]
pub struct NewEstate {
    pub company_id: i32,
    pub name: String,
    pub estate_type: String,
    pub address: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::buildings)]
pub struct Building {
    pub id: i32,
    pub company_id: i32,
    pub estate_id: Option<i32>,
    #[schema(example = "Block A")]
    pub name: String,
    #[schema(example = "multi_unit")]
    pub building_type: String,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::buildings)]
pub struct NewBuilding {
    pub company_id: i32,
    pub estate_id: Option<i32>,
    pub name: String,
    pub building_type: String,
    pub address: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::units)]
pub struct Unit {
    pub id: i32,
    pub company_id: i32,
    pub building_id: i32,
    #[schema(example = "12B")]
    pub number: String,
    #[schema(example = "apartment")]
    pub unit_type: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::units)]
pub struct NewUnit {
    pub company_id: i32,
    pub building_id: i32,
    pub number: String,
    pub unit_type: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::sub_units)]
pub struct SubUnit {
    pub id: i32,
    pub company_id: i32,
    pub unit_id: i32,
    #[schema(example = "Store room")]
    pub name: String,
    #[schema(example = "store")]
    pub sub_unit_type: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::sub_units)]
pub struct NewSubUnit {
    pub company_id: i32,
    pub unit_id: i32,
    pub name: String,
    pub sub_unit_type: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::property_images)]
pub struct PropertyImage {
    pub id: i32,
    pub company_id: i32,
    pub target_kind: String,
    pub target_id: i32,
    pub path: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::property_images)]
pub struct NewPropertyImage {
    pub company_id: i32,
    pub target_kind: String,
    pub target_id: i32,
    pub path: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::financial_categories)]
pub struct FinancialCategory {
    pub id: i32,
    pub company_id: i32,
    #[schema(example = "Rental income")]
    pub name: String,
    #[schema(example = "income")]
    pub category_type: String,
    pub description: Option<String>,
    pub is_tax_deductible: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::financial_categories)]
pub struct NewFinancialCategory {
    pub company_id: i32,
    pub name: String,
    pub category_type: String,
    pub description: Option<String>,
    pub is_tax_deductible: bool,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::financial_transactions)]
pub struct FinancialTransaction {
    pub id: i32,
    pub company_id: i32,
    pub category_id: i32,
    #[schema(example = "income")]
    pub transaction_type: String,
    #[schema(example = "unit")]
    pub target_kind: String,
    pub target_id: i32,
    #[schema(example = 1250000)]
    pub amount_cents: i64,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub is_paid: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::financial_transactions)]
pub struct NewFinancialTransaction {
    pub company_id: i32,
    pub category_id: i32,
    pub transaction_type: String,
    pub target_kind: String,
    pub target_id: i32,
    pub amount_cents: i64,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub is_paid: bool,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::property_purchases)]
pub struct PropertyPurchase {
    pub id: i32,
    pub company_id: i32,
    #[schema(example = "unit")]
    pub target_kind: String,
    pub target_id: i32,
    pub purchase_date: NaiveDate,
    #[schema(example = "business")]
    pub purchase_type: String,
    #[schema(example = 185000000)]
    pub purchase_price_cents: i64,
    pub transfer_duty_cents: i64,
    pub is_vat_applicable: bool,
    pub vat_cents: i64,
    pub transfer_cost_cents: i64,
    pub conveyancing_fees_cents: i64,
    pub deeds_office_fees_cents: i64,
    pub down_payment_cents: i64,
    pub financing_cents: i64,
    pub bond_registration_cents: i64,
    pub bond_initiation_cents: i64,
    pub clearance_cents: i64,
    pub initial_repairs_cents: i64,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::property_purchases)]
pub struct NewPropertyPurchase {
    pub company_id: i32,
    pub target_kind: String,
    pub target_id: i32,
    pub purchase_date: NaiveDate,
    pub purchase_type: String,
    pub purchase_price_cents: i64,
    pub transfer_duty_cents: i64,
    pub is_vat_applicable: bool,
    pub vat_cents: i64,
    pub transfer_cost_cents: i64,
    pub conveyancing_fees_cents: i64,
    pub deeds_office_fees_cents: i64,
    pub down_payment_cents: i64,
    pub financing_cents: i64,
    pub bond_registration_cents: i64,
    pub bond_initiation_cents: i64,
    pub clearance_cents: i64,
    pub initial_repairs_cents: i64,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::recurring_transactions)]
pub struct RecurringTransaction {
    pub id: i32,
    pub company_id: i32,
    pub category_id: i32,
    #[schema(example = "income")]
    pub transaction_type: String,
    #[schema(example = "unit")]
    pub target_kind: String,
    pub target_id: i32,
    pub amount_cents: i64,
    #[schema(example = "monthly")]
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_due_date: NaiveDate,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::recurring_transactions)]
pub struct NewRecurringTransaction {
    pub company_id: i32,
    pub category_id: i32,
    pub transaction_type: String,
    pub target_kind: String,
    pub target_id: i32,
    pub amount_cents: i64,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_due_date: NaiveDate,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
}
