//! Email verification and invitation completion.
//!
//! Tokens are single-use: every successful use rotates the stored token.

use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::error::DomainError;
use crate::events::{AggregateType, EventMetadata, EventType, OutboxService};
use crate::models::User;
use crate::schema::users;
use crate::tenancy::membership::activate_pending;

fn find_by_token(conn: &mut PgConnection, token: Uuid) -> Result<User, DomainError> {
    users::table
        .filter(users::verification_token.eq(token))
        .select(User::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(DomainError::InvalidToken)
}

pub const PASSWORD_REQUIRED: &str =
    "This account has no password yet. Finish registration with the same token.";

/// Marks the address as verified and activates pending company access.
///
/// Invited accounts without a password are refused and the token is left
/// intact, so it still works for [`complete_registration`].
pub fn verify_email(conn: &mut PgConnection, token: Uuid) -> Result<User, DomainError> {
    conn.transaction::<_, DomainError, _>(|conn| {
        let user = find_by_token(conn, token)?;
        if user.password_hash.is_none() {
            return Err(DomainError::BadRequest(PASSWORD_REQUIRED.to_string()));
        }
        if user.email_verified {
            return Err(DomainError::InvalidToken);
        }

        let user = diesel::update(users::table.find(user.id))
            .set((
                users::email_verified.eq(true),
                users::verification_token.eq(Uuid::new_v4()),
                users::updated_at.eq(diesel::dsl::now),
            ))
            .returning(User::as_returning())
            .get_result(conn)?;

        let activated = activate_pending(conn, user.id)?;

        OutboxService::emit(
            conn,
            EventType::EmailVerified,
            AggregateType::User,
            user.id,
            &serde_json::json!({ "email": user.email, "activated_access": activated }),
            EventMetadata::new().with_user(user.id),
        )?;

        info!(user_id = %user.id, activated, "Email verified");
        Ok(user)
    })
}

/// Sets the first password of an invited account. Completing registration
/// also proves ownership of the address.
pub fn complete_registration(
    conn: &mut PgConnection,
    token: Uuid,
    password_hash: &str,
    full_name: Option<String>,
) -> Result<User, DomainError> {
    conn.transaction::<_, DomainError, _>(|conn| {
        let user = find_by_token(conn, token)?;
        if user.password_hash.is_some() {
            return Err(DomainError::Conflict(
                "Registration has already been completed.".to_string(),
            ));
        }

        let full_name = full_name.or(user.full_name.clone());

        let user = diesel::update(users::table.find(user.id))
            .set((
                users::password_hash.eq(Some(password_hash)),
                users::full_name.eq(full_name),
                users::email_verified.eq(true),
                users::verification_token.eq(Uuid::new_v4()),
                users::updated_at.eq(diesel::dsl::now),
            ))
            .returning(User::as_returning())
            .get_result(conn)?;

        let activated = activate_pending(conn, user.id)?;

        OutboxService::emit(
            conn,
            EventType::RegistrationCompleted,
            AggregateType::User,
            user.id,
            &serde_json::json!({ "email": user.email, "activated_access": activated }),
            EventMetadata::new().with_user(user.id),
        )?;

        info!(user_id = %user.id, activated, "Registration completed");
        Ok(user)
    })
}
