//! Financial categories, transactions, purchases and recurring templates
//! attached to properties.

pub mod purchases;
pub mod recurring;
pub mod transactions;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::DomainError;
use crate::models::{FinancialCategory, NewFinancialCategory};
use crate::properties::hierarchy::resolve_target;
use crate::properties::TargetRef;
use crate::schema::financial_categories;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Income,
    Expense,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Income => "income",
            EntryType::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(EntryType::Income),
            "expense" => Some(EntryType::Expense),
            _ => None,
        }
    }
}

/// Finance records hang off estates, buildings and units of the current
/// company. Unknown targets are reported on `target_id`.
pub fn resolve_finance_target(
    conn: &mut PgConnection,
    target: TargetRef,
    company_id: i32,
) -> Result<(), DomainError> {
    if !target.kind.is_finance_target() {
        return Err(DomainError::validation(
            "target_kind",
            "Finance records can only be attached to estates, buildings or units.",
        ));
    }

    resolve_target(conn, target, company_id)
        .map(|_| ())
        .map_err(|err| match err {
            DomainError::NotFound(what) => {
                DomainError::validation("target_id", format!("{} not found.", what))
            }
            other => other,
        })
}

pub fn create_category(
    conn: &mut PgConnection,
    company_id: i32,
    name: String,
    category_type: EntryType,
    description: Option<String>,
    is_tax_deductible: bool,
) -> Result<FinancialCategory, DomainError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation("name", "Category name is required."));
    }

    let category = diesel::insert_into(financial_categories::table)
        .values(&NewFinancialCategory {
            company_id,
            name,
            category_type: category_type.as_str().to_string(),
            description,
            is_tax_deductible,
        })
        .returning(FinancialCategory::as_returning())
        .get_result(conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => DomainError::validation(
                "name",
                "A category with this name and type already exists.",
            ),
            other => other.into(),
        })?;

    info!(category_id = category.id, company_id, "Financial category created");
    Ok(category)
}

pub fn list_categories(
    conn: &mut PgConnection,
    company_id: i32,
    category_type: Option<EntryType>,
) -> QueryResult<Vec<FinancialCategory>> {
    let mut query = financial_categories::table
        .filter(financial_categories::company_id.eq(company_id))
        .into_boxed();
    if let Some(t) = category_type {
        query = query.filter(financial_categories::category_type.eq(t.as_str()));
    }
    query
        .order((
            financial_categories::category_type.asc(),
            financial_categories::name.asc(),
        ))
        .select(FinancialCategory::as_select())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_round_trips_through_storage_form() {
        for t in [EntryType::Income, EntryType::Expense] {
            assert_eq!(EntryType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntryType::parse("transfer"), None);
    }
}
