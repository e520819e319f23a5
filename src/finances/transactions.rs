use chrono::NaiveDate;
use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{FinancialCategory, FinancialTransaction, NewFinancialTransaction};
use crate::pagination::PaginationParams;
use crate::properties::hierarchy::resolve_target;
use crate::properties::TargetRef;
use crate::schema::{financial_categories, financial_transactions};

use super::{resolve_finance_target, EntryType};

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub category_id: i32,
    pub transaction_type: EntryType,
    pub target: TargetRef,
    pub amount_cents: i64,
    pub transaction_date: NaiveDate,
    pub description: Option<String>,
    pub is_paid: bool,
}

/// The category's type must match the transaction's.
pub fn check_category_type(
    category_type: &str,
    transaction_type: EntryType,
) -> Result<(), DomainError> {
    if category_type == transaction_type.as_str() {
        return Ok(());
    }
    Err(DomainError::validation(
        "category_id",
        format!(
            "Category is for {} entries, but this is an {} transaction.",
            category_type,
            transaction_type.as_str()
        ),
    ))
}

/// A category of the current company. Others read as unknown.
pub(crate) fn company_category(
    conn: &mut PgConnection,
    company_id: i32,
    category_id: i32,
) -> Result<FinancialCategory, DomainError> {
    financial_categories::table
        .find(category_id)
        .filter(financial_categories::company_id.eq(company_id))
        .select(FinancialCategory::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| DomainError::validation("category_id", "Unknown category."))
}

pub fn create_transaction(
    conn: &mut PgConnection,
    company_id: i32,
    created_by: Uuid,
    input: NewTransaction,
) -> Result<FinancialTransaction, DomainError> {
    if !input.target.kind.is_finance_target() {
        return Err(DomainError::validation(
            "target_kind",
            "Transactions can only be recorded against estates, buildings or units.",
        ));
    }
    if input.amount_cents < 0 {
        return Err(DomainError::validation(
            "amount_cents",
            "Amount cannot be negative.",
        ));
    }

    let category = company_category(conn, company_id, input.category_id)?;
    check_category_type(&category.category_type, input.transaction_type)?;
    resolve_finance_target(conn, input.target, company_id)?;

    let transaction = diesel::insert_into(financial_transactions::table)
        .values(&NewFinancialTransaction {
            company_id,
            category_id: category.id,
            transaction_type: input.transaction_type.as_str().to_string(),
            target_kind: input.target.kind.as_str().to_string(),
            target_id: input.target.id,
            amount_cents: input.amount_cents,
            transaction_date: input.transaction_date,
            description: input.description,
            is_paid: input.is_paid,
            created_by: Some(created_by),
        })
        .returning(FinancialTransaction::as_returning())
        .get_result(conn)?;

    info!(
        transaction_id = transaction.id,
        company_id,
        kind = %input.target.kind,
        target_id = input.target.id,
        "Financial transaction recorded"
    );
    Ok(transaction)
}

pub fn list_transactions(
    conn: &mut PgConnection,
    company_id: i32,
    target: Option<TargetRef>,
    pagination: &PaginationParams,
) -> Result<(Vec<FinancialTransaction>, i64), DomainError> {
    if let Some(target) = target {
        resolve_target(conn, target, company_id)?;
    }

    let filtered = || {
        let mut query = financial_transactions::table
            .filter(financial_transactions::company_id.eq(company_id))
            .into_boxed::<diesel::pg::Pg>();
        if let Some(target) = target {
            query = query
                .filter(financial_transactions::target_kind.eq(target.kind.as_str()))
                .filter(financial_transactions::target_id.eq(target.id));
        }
        query
    };

    let total: i64 = filtered().count().get_result(conn)?;
    let (limit, offset) = pagination.limit_offset();
    let rows = filtered()
        .order((
            financial_transactions::transaction_date.desc(),
            financial_transactions::id.desc(),
        ))
        .limit(limit)
        .offset(offset)
        .select(FinancialTransaction::as_select())
        .load(conn)?;

    Ok((rows, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_category_is_reported_on_category_field() {
        match check_category_type("expense", EntryType::Income) {
            Err(DomainError::Validation { field, message }) => {
                assert_eq!(field, Some("category_id"));
                assert!(message.contains("expense"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_category_passes() {
        assert!(check_category_type("income", EntryType::Income).is_ok());
        assert!(check_category_type("expense", EntryType::Expense).is_ok());
    }
}
