//! Guarded mutations of company access rows.

use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::error::DomainError;
use crate::events::{
    AccessChangedPayload, AccessInvitedPayload, AggregateType, EventMetadata, EventType,
    OutboxService,
};
use crate::models::{NewUser, NewUserCompanyAccess, User, UserCompanyAccess};
use crate::pagination::PaginationParams;
use crate::schema::{companies, user_company_access, users};

use super::roles::{AccessProfile, AccessStatus, Role};

pub const GLOBAL_ROLE_REJECTION: &str =
    "Superadmin and Subadmin cannot be assigned to any company.";

#[derive(Debug, Clone)]
pub struct Invitation {
    pub email: String,
    pub role: Role,
    pub full_name: Option<String>,
    /// Update the role of an existing row instead of rejecting the invite.
    pub update_existing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    Created,
    Reactivated,
    RoleUpdated,
}

#[derive(Debug, Clone)]
pub struct InviteResult {
    pub outcome: InviteOutcome,
    pub user: User,
    pub access: UserCompanyAccess,
    pub user_created: bool,
}

fn reject_global(role: Role) -> Result<(), DomainError> {
    if role.is_global() {
        return Err(DomainError::validation("role", GLOBAL_ROLE_REJECTION));
    }
    Ok(())
}

/// Finds the user by email or creates an unverified one with a fresh
/// verification token and no password.
pub fn resolve_or_create_user(
    conn: &mut PgConnection,
    email: &str,
    full_name: Option<String>,
) -> QueryResult<(User, bool)> {
    let email = email.trim().to_lowercase();

    if let Some(user) = users::table
        .filter(users::email.eq(&email))
        .select(User::as_select())
        .first(conn)
        .optional()?
    {
        return Ok((user, false));
    }

    let user = diesel::insert_into(users::table)
        .values(&NewUser {
            email,
            password_hash: None,
            full_name,
            email_verified: false,
            verification_token: Uuid::new_v4(),
        })
        .returning(User::as_returning())
        .get_result(conn)?;

    Ok((user, true))
}

fn rotate_verification_token(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<User> {
    diesel::update(users::table.find(user_id))
        .set((
            users::verification_token.eq(Uuid::new_v4()),
            users::updated_at.eq(diesel::dsl::now),
        ))
        .returning(User::as_returning())
        .get_result(conn)
}

/// Grants `invitation.email` access to `company_id`.
///
/// The user lookup, the access row and the outbox event are written in one
/// transaction; mail delivery happens later from the outbox.
pub fn invite(
    conn: &mut PgConnection,
    inviter: &AccessProfile,
    company_id: i32,
    invitation: Invitation,
    request_id: Option<String>,
) -> Result<InviteResult, DomainError> {
    reject_global(invitation.role)?;

    if !inviter.can_invite(company_id) {
        return Err(DomainError::forbidden(
            "Only company owners can invite users to this company.",
        ));
    }

    let company_name: String = companies::table
        .find(company_id)
        .select(companies::name)
        .first(conn)
        .optional()?
        .ok_or(DomainError::NotFound("Company"))?;

    conn.transaction::<_, DomainError, _>(|conn| {
        let (mut user, user_created) =
            resolve_or_create_user(conn, &invitation.email, invitation.full_name.clone())?;

        let needs_password = user.password_hash.is_none();
        if !user_created && (needs_password || !user.email_verified) {
            user = rotate_verification_token(conn, user.id)?;
        }

        let existing: Option<UserCompanyAccess> = user_company_access::table
            .filter(user_company_access::user_id.eq(user.id))
            .filter(user_company_access::company_id.eq(company_id))
            .select(UserCompanyAccess::as_select())
            .for_update()
            .first(conn)
            .optional()?;

        let status = AccessStatus::for_user(user.email_verified);

        let (outcome, access) = match existing {
            None => {
                let access = diesel::insert_into(user_company_access::table)
                    .values(&NewUserCompanyAccess {
                        user_id: user.id,
                        company_id,
                        role: invitation.role.code().to_string(),
                        status: status.as_str().to_string(),
                    })
                    .returning(UserCompanyAccess::as_returning())
                    .get_result(conn)?;
                (InviteOutcome::Created, access)
            }
            Some(row) if row.status == AccessStatus::Revoked.as_str() => {
                let access = diesel::update(user_company_access::table.find(row.id))
                    .set((
                        user_company_access::role.eq(invitation.role.code()),
                        user_company_access::status.eq(status.as_str()),
                        user_company_access::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(UserCompanyAccess::as_returning())
                    .get_result(conn)?;
                (InviteOutcome::Reactivated, access)
            }
            Some(row) if invitation.update_existing => {
                let access = diesel::update(user_company_access::table.find(row.id))
                    .set((
                        user_company_access::role.eq(invitation.role.code()),
                        user_company_access::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(UserCompanyAccess::as_returning())
                    .get_result(conn)?;
                (InviteOutcome::RoleUpdated, access)
            }
            Some(_) => {
                return Err(DomainError::Conflict(
                    "User already has access to this company.".to_string(),
                ));
            }
        };

        let metadata = EventMetadata::new()
            .with_user(inviter.user_id)
            .with_company(company_id)
            .with_request_id(request_id);

        match outcome {
            InviteOutcome::Created | InviteOutcome::Reactivated => {
                OutboxService::emit(
                    conn,
                    EventType::AccessInvited,
                    AggregateType::Access,
                    access.id,
                    &AccessInvitedPayload {
                        email: user.email.clone(),
                        company_id,
                        company_name: company_name.clone(),
                        role: invitation.role.label().to_string(),
                        invited_by: inviter.user_id,
                        verification_token: (needs_password || !user.email_verified)
                            .then_some(user.verification_token),
                        new_user: user_created,
                        needs_password,
                    },
                    metadata,
                )?;
            }
            InviteOutcome::RoleUpdated => {
                OutboxService::emit(
                    conn,
                    EventType::AccessRoleChanged,
                    AggregateType::Access,
                    access.id,
                    &AccessChangedPayload {
                        user_id: user.id,
                        company_id,
                        role: access.role.clone(),
                        status: access.status.clone(),
                        changed_by: inviter.user_id,
                    },
                    metadata,
                )?;
            }
        }

        info!(
            user_id = %user.id,
            company_id,
            role = %invitation.role.code(),
            outcome = ?outcome,
            "Company access granted"
        );

        Ok(InviteResult {
            outcome,
            user,
            access,
            user_created,
        })
    })
    .map_err(|err| match err {
        DomainError::Database(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => DomainError::Conflict("User already has access to this company.".to_string()),
        other => other,
    })
}

fn find_access(
    conn: &mut PgConnection,
    company_id: i32,
    access_id: i32,
) -> Result<UserCompanyAccess, DomainError> {
    user_company_access::table
        .filter(user_company_access::id.eq(access_id))
        .filter(user_company_access::company_id.eq(company_id))
        .select(UserCompanyAccess::as_select())
        .first(conn)
        .optional()?
        .ok_or(DomainError::NotFound("Access"))
}

pub fn change_role(
    conn: &mut PgConnection,
    actor: &AccessProfile,
    company_id: i32,
    access_id: i32,
    role: Role,
    request_id: Option<String>,
) -> Result<UserCompanyAccess, DomainError> {
    reject_global(role)?;

    if !actor.can_manage_members(company_id) {
        return Err(DomainError::forbidden(
            "You do not have permission to manage members of this company.",
        ));
    }

    conn.transaction::<_, DomainError, _>(|conn| {
        let row = find_access(conn, company_id, access_id)?;
        if row.status == AccessStatus::Revoked.as_str() {
            return Err(DomainError::NotFound("Access"));
        }

        let updated = diesel::update(user_company_access::table.find(row.id))
            .set((
                user_company_access::role.eq(role.code()),
                user_company_access::updated_at.eq(diesel::dsl::now),
            ))
            .returning(UserCompanyAccess::as_returning())
            .get_result(conn)?;

        OutboxService::emit(
            conn,
            EventType::AccessRoleChanged,
            AggregateType::Access,
            updated.id,
            &AccessChangedPayload {
                user_id: updated.user_id,
                company_id,
                role: updated.role.clone(),
                status: updated.status.clone(),
                changed_by: actor.user_id,
            },
            EventMetadata::new()
                .with_user(actor.user_id)
                .with_company(company_id)
                .with_request_id(request_id),
        )?;

        Ok(updated)
    })
}

/// Revokes an access row. The row is kept with status `revoked`.
pub fn remove_access(
    conn: &mut PgConnection,
    actor: &AccessProfile,
    company_id: i32,
    access_id: i32,
    request_id: Option<String>,
) -> Result<UserCompanyAccess, DomainError> {
    if !actor.can_manage_members(company_id) {
        return Err(DomainError::forbidden(
            "You do not have permission to remove members of this company.",
        ));
    }

    conn.transaction::<_, DomainError, _>(|conn| {
        let row = find_access(conn, company_id, access_id)?;
        if row.status == AccessStatus::Revoked.as_str() {
            return Err(DomainError::NotFound("Access"));
        }

        let revoked = diesel::update(user_company_access::table.find(row.id))
            .set((
                user_company_access::status.eq(AccessStatus::Revoked.as_str()),
                user_company_access::updated_at.eq(diesel::dsl::now),
            ))
            .returning(UserCompanyAccess::as_returning())
            .get_result(conn)?;

        OutboxService::emit(
            conn,
            EventType::AccessRevoked,
            AggregateType::Access,
            revoked.id,
            &AccessChangedPayload {
                user_id: revoked.user_id,
                company_id,
                role: revoked.role.clone(),
                status: revoked.status.clone(),
                changed_by: actor.user_id,
            },
            EventMetadata::new()
                .with_user(actor.user_id)
                .with_company(company_id)
                .with_request_id(request_id),
        )?;

        info!(user_id = %revoked.user_id, company_id, removed_by = %actor.user_id, "Company access revoked");
        Ok(revoked)
    })
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub access: UserCompanyAccess,
    pub email: String,
    pub full_name: Option<String>,
    pub email_verified: bool,
}

/// Non-revoked access rows of a company, ordered by email.
pub fn list_members(
    conn: &mut PgConnection,
    company_id: i32,
    pagination: &PaginationParams,
) -> QueryResult<(Vec<MemberRow>, i64)> {
    let total: i64 = user_company_access::table
        .filter(user_company_access::company_id.eq(company_id))
        .filter(user_company_access::status.ne(AccessStatus::Revoked.as_str()))
        .count()
        .get_result(conn)?;

    let (limit, offset) = pagination.limit_offset();

    let rows: Vec<(UserCompanyAccess, String, Option<String>, bool)> = user_company_access::table
        .inner_join(users::table)
        .filter(user_company_access::company_id.eq(company_id))
        .filter(user_company_access::status.ne(AccessStatus::Revoked.as_str()))
        .order(users::email.asc())
        .limit(limit)
        .offset(offset)
        .select((
            UserCompanyAccess::as_select(),
            users::email,
            users::full_name,
            users::email_verified,
        ))
        .load(conn)?;

    let members = rows
        .into_iter()
        .map(|(access, email, full_name, email_verified)| MemberRow {
            access,
            email,
            full_name,
            email_verified,
        })
        .collect();

    Ok((members, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_roles_are_rejected_with_field() {
        for role in [Role::Superadmin, Role::Subadmin] {
            match reject_global(role) {
                Err(DomainError::Validation { field, message }) => {
                    assert_eq!(field, Some("role"));
                    assert_eq!(message, GLOBAL_ROLE_REJECTION);
                }
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_company_roles_pass() {
        for role in [
            Role::CompanyOwner,
            Role::CompanyUser,
            Role::Tenant,
            Role::Buyer,
        ] {
            assert!(reject_global(role).is_ok());
        }
    }
}
