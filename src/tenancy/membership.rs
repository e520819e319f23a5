//! Loading a user's reachable companies and access profile.

use diesel::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Company, NewCompany, NewUserCompanyAccess};
use crate::schema::{companies, user_company_access, users};

use super::context::CompanySnapshot;
use super::roles::{AccessProfile, AccessStatus, Membership, Role};

fn global_role(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Option<Role>> {
    let code: Option<String> = users::table
        .find(user_id)
        .select(users::global_role)
        .first::<Option<String>>(conn)
        .optional()?
        .flatten();
    Ok(code.as_deref().and_then(Role::from_code))
}

/// Active memberships plus the global role, if any.
pub fn load_profile(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<AccessProfile> {
    let rows: Vec<(i32, String)> = user_company_access::table
        .filter(user_company_access::user_id.eq(user_id))
        .filter(user_company_access::status.eq(AccessStatus::Active.as_str()))
        .select((user_company_access::company_id, user_company_access::role))
        .load(conn)?;

    let memberships = rows
        .into_iter()
        .filter_map(|(company_id, code)| match Role::from_code(&code) {
            Some(role) if !role.is_global() => Some(Membership { company_id, role }),
            _ => {
                warn!(user_id = %user_id, company_id, role = %code, "Ignoring invalid access row role");
                None
            }
        })
        .collect();

    Ok(AccessProfile::new(
        user_id,
        global_role(conn, user_id)?,
        memberships,
    ))
}

/// Companies the user can operate against, ordered by id.
///
/// Platform staff (Superadmin, Subadmin) reach every company.
pub fn accessible_companies(
    conn: &mut PgConnection,
    profile: &AccessProfile,
) -> QueryResult<Vec<CompanySnapshot>> {
    let rows: Vec<(i32, String)> = if profile.global_role.is_some() {
        companies::table
            .order(companies::id.asc())
            .select((companies::id, companies::name))
            .load(conn)?
    } else {
        let ids: Vec<i32> = profile.memberships.iter().map(|m| m.company_id).collect();
        companies::table
            .filter(companies::id.eq_any(ids))
            .order(companies::id.asc())
            .select((companies::id, companies::name))
            .load(conn)?
    };

    Ok(rows
        .into_iter()
        .map(|(id, name)| CompanySnapshot { id, name })
        .collect())
}

/// Creates a company and makes `owner_id` its active Company Owner.
pub fn create_company_with_owner(
    conn: &mut PgConnection,
    owner_id: Uuid,
    new_company: &NewCompany,
) -> QueryResult<Company> {
    let company: Company = diesel::insert_into(companies::table)
        .values(new_company)
        .returning(Company::as_returning())
        .get_result(conn)?;

    diesel::insert_into(user_company_access::table)
        .values(&NewUserCompanyAccess {
            user_id: owner_id,
            company_id: company.id,
            role: Role::CompanyOwner.code().to_string(),
            status: AccessStatus::Active.as_str().to_string(),
        })
        .execute(conn)?;

    Ok(company)
}

/// Promotes every pending access row of the user to active.
pub fn activate_pending(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        user_company_access::table
            .filter(user_company_access::user_id.eq(user_id))
            .filter(user_company_access::status.eq(AccessStatus::Pending.as_str())),
    )
    .set((
        user_company_access::status.eq(AccessStatus::Active.as_str()),
        user_company_access::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
}
