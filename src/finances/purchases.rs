//! Acquisition records of estates, buildings and units.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{NewPropertyPurchase, PropertyPurchase};
use crate::properties::TargetRef;
use crate::schema::property_purchases;

use super::resolve_finance_target;

/// Down payment plus financing may differ from the price by this much.
pub const FUNDING_TOLERANCE_CENTS: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseType {
    Individual,
    #[default]
    Business,
    Trust,
}

impl PurchaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseType::Individual => "individual",
            PurchaseType::Business => "business",
            PurchaseType::Trust => "trust",
        }
    }
}

/// All amounts are in minor currency units.
#[derive(Debug, Clone, Default)]
pub struct PurchaseCosts {
    pub purchase_price: i64,
    pub transfer_duty: i64,
    pub is_vat_applicable: bool,
    pub vat: i64,
    pub transfer_cost: i64,
    pub conveyancing_fees: i64,
    pub deeds_office_fees: i64,
    pub down_payment: i64,
    pub financing: i64,
    pub bond_registration: i64,
    pub bond_initiation: i64,
    pub clearance: i64,
    pub initial_repairs: i64,
}

impl PurchaseCosts {
    fn amounts(&self) -> [(&'static str, i64); 12] {
        [
            ("purchase_price_cents", self.purchase_price),
            ("transfer_duty_cents", self.transfer_duty),
            ("vat_cents", self.vat),
            ("transfer_cost_cents", self.transfer_cost),
            ("conveyancing_fees_cents", self.conveyancing_fees),
            ("deeds_office_fees_cents", self.deeds_office_fees),
            ("down_payment_cents", self.down_payment),
            ("financing_cents", self.financing),
            ("bond_registration_cents", self.bond_registration),
            ("bond_initiation_cents", self.bond_initiation),
            ("clearance_cents", self.clearance),
            ("initial_repairs_cents", self.initial_repairs),
        ]
    }

    /// A purchase pays transfer duty or VAT, never both. Without VAT the
    /// down payment and the financed amount must cover the price.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some((field, _)) = self.amounts().into_iter().find(|(_, v)| *v < 0) {
            return Err(DomainError::validation(field, "Amount cannot be negative."));
        }

        if self.is_vat_applicable && self.transfer_duty > 0 {
            return Err(DomainError::validation(
                "transfer_duty_cents",
                "Either transfer duty or VAT applies to a purchase, not both.",
            ));
        }

        if !self.is_vat_applicable {
            let funded = self.down_payment.saturating_add(self.financing);
            if (funded - self.purchase_price).abs() > FUNDING_TOLERANCE_CENTS {
                return Err(DomainError::validation(
                    "financing_cents",
                    "Down payment plus financing amount must equal the purchase price.",
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub target: TargetRef,
    pub purchase_date: NaiveDate,
    pub purchase_type: PurchaseType,
    pub costs: PurchaseCosts,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PurchaseTotals {
    pub acquisition_cents: i64,
    pub transfer_cents: i64,
    pub bond_cents: i64,
}

impl PropertyPurchase {
    pub fn totals(&self) -> PurchaseTotals {
        let transfer = self.transfer_duty_cents
            + self.vat_cents
            + self.transfer_cost_cents
            + self.conveyancing_fees_cents
            + self.deeds_office_fees_cents
            + self.clearance_cents;
        let bond = self.bond_registration_cents + self.bond_initiation_cents;

        PurchaseTotals {
            acquisition_cents: self.purchase_price_cents
                + transfer
                + bond
                + self.initial_repairs_cents,
            transfer_cents: transfer,
            bond_cents: bond,
        }
    }
}

pub fn create_purchase(
    conn: &mut PgConnection,
    company_id: i32,
    created_by: Uuid,
    input: NewPurchase,
) -> Result<PropertyPurchase, DomainError> {
    input.costs.validate()?;
    resolve_finance_target(conn, input.target, company_id)?;

    let c = &input.costs;
    let purchase = diesel::insert_into(property_purchases::table)
        .values(&NewPropertyPurchase {
            company_id,
            target_kind: input.target.kind.as_str().to_string(),
            target_id: input.target.id,
            purchase_date: input.purchase_date,
            purchase_type: input.purchase_type.as_str().to_string(),
            purchase_price_cents: c.purchase_price,
            transfer_duty_cents: c.transfer_duty,
            is_vat_applicable: c.is_vat_applicable,
            vat_cents: c.vat,
            transfer_cost_cents: c.transfer_cost,
            conveyancing_fees_cents: c.conveyancing_fees,
            deeds_office_fees_cents: c.deeds_office_fees,
            down_payment_cents: c.down_payment,
            financing_cents: c.financing,
            bond_registration_cents: c.bond_registration,
            bond_initiation_cents: c.bond_initiation,
            clearance_cents: c.clearance,
            initial_repairs_cents: c.initial_repairs,
            notes: input.notes,
            created_by: Some(created_by),
        })
        .returning(PropertyPurchase::as_returning())
        .get_result(conn)?;

    info!(
        purchase_id = purchase.id,
        company_id,
        kind = %input.target.kind,
        target_id = input.target.id,
        "Property purchase recorded"
    );
    Ok(purchase)
}

/// Purchases of the company, newest first, optionally for one target.
pub fn list_purchases(
    conn: &mut PgConnection,
    company_id: i32,
    target: Option<TargetRef>,
) -> Result<Vec<PropertyPurchase>, DomainError> {
    let mut query = property_purchases::table
        .filter(property_purchases::company_id.eq(company_id))
        .into_boxed();
    if let Some(target) = target {
        resolve_finance_target(conn, target, company_id)?;
        query = query
            .filter(property_purchases::target_kind.eq(target.kind.as_str()))
            .filter(property_purchases::target_id.eq(target.id));
    }

    Ok(query
        .order((
            property_purchases::purchase_date.desc(),
            property_purchases::id.desc(),
        ))
        .select(PropertyPurchase::as_select())
        .load(conn)?)
}
