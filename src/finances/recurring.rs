//! Recurring income and expense templates.
//!
//! A template records the next due date. Generating it books one transaction
//! on that date and moves the due date on by the template's frequency; a
//! template whose next date passes its end date is deactivated.

use chrono::{Days, Months, NaiveDate};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{
    FinancialTransaction, NewFinancialTransaction, NewRecurringTransaction, RecurringTransaction,
};
use crate::properties::TargetRef;
use crate::schema::{financial_transactions, recurring_transactions};

use super::transactions::{check_category_type, company_category};
use super::{resolve_finance_target, EntryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Semiannually,
    Annually,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Semiannually => "semiannually",
            Frequency::Annually => "annually",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Biweekly,
            Frequency::Monthly,
            Frequency::Quarterly,
            Frequency::Semiannually,
            Frequency::Annually,
        ]
        .into_iter()
        .find(|f| f.as_str() == s)
    }

    /// The due date after `date`. Month steps clamp to the end of shorter
    /// months (Jan 31 monthly is followed by Feb 28 or 29).
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Daily => date.checked_add_days(Days::new(1)),
            Frequency::Weekly => date.checked_add_days(Days::new(7)),
            Frequency::Biweekly => date.checked_add_days(Days::new(14)),
            Frequency::Monthly => date.checked_add_months(Months::new(1)),
            Frequency::Quarterly => date.checked_add_months(Months::new(3)),
            Frequency::Semiannually => date.checked_add_months(Months::new(6)),
            Frequency::Annually => date.checked_add_months(Months::new(12)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRecurring {
    pub category_id: i32,
    pub transaction_type: EntryType,
    pub target: TargetRef,
    pub amount_cents: i64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
}

pub fn create_recurring(
    conn: &mut PgConnection,
    company_id: i32,
    created_by: Uuid,
    input: NewRecurring,
) -> Result<RecurringTransaction, DomainError> {
    if input.amount_cents < 0 {
        return Err(DomainError::validation("amount_cents", "Amount cannot be negative."));
    }
    if input.end_date.is_some_and(|end| end < input.start_date) {
        return Err(DomainError::validation(
            "end_date",
            "End date cannot be before the start date.",
        ));
    }

    let category = company_category(conn, company_id, input.category_id)?;
    check_category_type(&category.category_type, input.transaction_type)?;
    resolve_finance_target(conn, input.target, company_id)?;

    let template = diesel::insert_into(recurring_transactions::table)
        .values(&NewRecurringTransaction {
            company_id,
            category_id: category.id,
            transaction_type: input.transaction_type.as_str().to_string(),
            target_kind: input.target.kind.as_str().to_string(),
            target_id: input.target.id,
            amount_cents: input.amount_cents,
            frequency: input.frequency.as_str().to_string(),
            start_date: input.start_date,
            end_date: input.end_date,
            next_due_date: input.start_date,
            description: input.description,
            created_by: Some(created_by),
        })
        .returning(RecurringTransaction::as_returning())
        .get_result(conn)?;

    info!(
        recurring_id = template.id,
        company_id,
        frequency = %template.frequency,
        "Recurring transaction created"
    );
    Ok(template)
}

pub fn list_recurring(
    conn: &mut PgConnection,
    company_id: i32,
) -> QueryResult<Vec<RecurringTransaction>> {
    recurring_transactions::table
        .filter(recurring_transactions::company_id.eq(company_id))
        .order((
            recurring_transactions::next_due_date.asc(),
            recurring_transactions::id.asc(),
        ))
        .select(RecurringTransaction::as_select())
        .load(conn)
}

/// Books the template's next occurrence and advances it.
pub fn generate_next(
    conn: &mut PgConnection,
    company_id: i32,
    created_by: Uuid,
    recurring_id: i32,
) -> Result<(FinancialTransaction, RecurringTransaction), DomainError> {
    conn.transaction::<_, DomainError, _>(|conn| {
        let template: RecurringTransaction = recurring_transactions::table
            .find(recurring_id)
            .filter(recurring_transactions::company_id.eq(company_id))
            .select(RecurringTransaction::as_select())
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(DomainError::NotFound("Recurring transaction"))?;

        if !template.is_active {
            return Err(DomainError::Conflict(
                "Recurring transaction is no longer active.".to_string(),
            ));
        }

        let frequency = Frequency::parse(&template.frequency).ok_or_else(|| {
            DomainError::BadRequest(format!("Unknown frequency '{}'", template.frequency))
        })?;

        let transaction = diesel::insert_into(financial_transactions::table)
            .values(&NewFinancialTransaction {
                company_id,
                category_id: template.category_id,
                transaction_type: template.transaction_type.clone(),
                target_kind: template.target_kind.clone(),
                target_id: template.target_id,
                amount_cents: template.amount_cents,
                transaction_date: template.next_due_date,
                description: template.description.clone(),
                is_paid: false,
                created_by: Some(created_by),
            })
            .returning(FinancialTransaction::as_returning())
            .get_result(conn)?;

        let next_due = frequency.advance(template.next_due_date);
        let still_active = match (next_due, template.end_date) {
            (None, _) => false,
            (Some(next), Some(end)) => next <= end,
            (Some(_), None) => true,
        };

        let template = diesel::update(recurring_transactions::table.find(template.id))
            .set((
                recurring_transactions::next_due_date
                    .eq(next_due.unwrap_or(template.next_due_date)),
                recurring_transactions::is_active.eq(still_active),
                recurring_transactions::updated_at.eq(diesel::dsl::now),
            ))
            .returning(RecurringTransaction::as_returning())
            .get_result(conn)?;

        info!(
            recurring_id = template.id,
            transaction_id = transaction.id,
            next_due = %template.next_due_date,
            is_active = template.is_active,
            "Recurring transaction booked"
        );
        Ok((transaction, template))
    })
}
