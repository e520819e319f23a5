//! Roles, access-row status and the pure permission predicates.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "sa")]
    Superadmin,
    #[serde(alias = "su")]
    Subadmin,
    #[serde(alias = "co")]
    CompanyOwner,
    #[serde(alias = "cu")]
    CompanyUser,
    #[serde(alias = "te")]
    Tenant,
    #[serde(alias = "bu")]
    Buyer,
}

impl Role {
    /// Two-letter code stored in the database.
    pub fn code(&self) -> &'static str {
        match self {
            Role::Superadmin => "sa",
            Role::Subadmin => "su",
            Role::CompanyOwner => "co",
            Role::CompanyUser => "cu",
            Role::Tenant => "te",
            Role::Buyer => "bu",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "sa" => Some(Role::Superadmin),
            "su" => Some(Role::Subadmin),
            "co" => Some(Role::CompanyOwner),
            "cu" => Some(Role::CompanyUser),
            "te" => Some(Role::Tenant),
            "bu" => Some(Role::Buyer),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Superadmin => "Superadmin",
            Role::Subadmin => "Subadmin",
            Role::CompanyOwner => "Company Owner",
            Role::CompanyUser => "Company User",
            Role::Tenant => "Tenant",
            Role::Buyer => "Buyer",
        }
    }

    /// Process-wide roles that never appear on a company access row.
    pub fn is_global(&self) -> bool {
        matches!(self, Role::Superadmin | Role::Subadmin)
    }

    /// Standing inside a company. Tenant and Buyer rank equally.
    fn rank(&self) -> u8 {
        match self {
            Role::Superadmin => 5,
            Role::Subadmin => 4,
            Role::CompanyOwner => 3,
            Role::CompanyUser => 2,
            Role::Tenant | Role::Buyer => 1,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        if let Some(role) = Role::from_code(&normalized) {
            return Ok(role);
        }
        match normalized.as_str() {
            "superadmin" => Ok(Role::Superadmin),
            "subadmin" => Ok(Role::Subadmin),
            "company_owner" => Ok(Role::CompanyOwner),
            "company_user" => Ok(Role::CompanyUser),
            "tenant" => Ok(Role::Tenant),
            "buyer" => Ok(Role::Buyer),
            _ => Err(format!("Unknown role '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Pending,
    Active,
    Revoked,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Pending => "pending",
            AccessStatus::Active => "active",
            AccessStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AccessStatus::Pending),
            "active" => Some(AccessStatus::Active),
            "revoked" => Some(AccessStatus::Revoked),
            _ => None,
        }
    }

    /// Status a new or reactivated row gets for a user in this verification state.
    pub fn for_user(email_verified: bool) -> Self {
        if email_verified {
            AccessStatus::Active
        } else {
            AccessStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub company_id: i32,
    pub role: Role,
}

/// A user's global role plus their active company memberships.
///
/// Loaded once per request; every predicate here is a pure function of it.
#[derive(Debug, Clone)]
pub struct AccessProfile {
    pub user_id: Uuid,
    pub global_role: Option<Role>,
    pub memberships: Vec<Membership>,
}

impl AccessProfile {
    pub fn new(user_id: Uuid, global_role: Option<Role>, memberships: Vec<Membership>) -> Self {
        Self {
            user_id,
            global_role: global_role.filter(Role::is_global),
            memberships,
        }
    }

    pub fn is_superadmin(&self) -> bool {
        self.global_role == Some(Role::Superadmin)
    }

    pub fn is_subadmin(&self) -> bool {
        self.global_role == Some(Role::Subadmin)
    }

    pub fn role_in(&self, company_id: i32) -> Option<Role> {
        self.memberships
            .iter()
            .find(|m| m.company_id == company_id)
            .map(|m| m.role)
    }

    /// Superadmin passes every check. Subadmin counts as a Company User
    /// everywhere.
    pub fn has_role_at_least(&self, company_id: i32, minimum: Role) -> bool {
        if self.is_superadmin() {
            return true;
        }
        let effective = match (self.role_in(company_id), self.is_subadmin()) {
            (Some(role), _) => Some(role),
            (None, true) => Some(Role::CompanyUser),
            (None, false) => None,
        };
        effective.is_some_and(|role| role.rank() >= minimum.rank())
    }

    pub fn can_invite(&self, company_id: i32) -> bool {
        self.is_superadmin() || self.role_in(company_id) == Some(Role::CompanyOwner)
    }

    /// Removing members and changing their roles.
    pub fn can_manage_members(&self, company_id: i32) -> bool {
        self.is_subadmin() || self.can_invite(company_id)
    }

    pub fn can_manage_company(&self, company_id: i32) -> bool {
        self.has_role_at_least(company_id, Role::CompanyOwner)
    }

    pub fn can_edit_properties(&self, company_id: i32) -> bool {
        self.has_role_at_least(company_id, Role::CompanyUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(global: Option<Role>, memberships: &[(i32, Role)]) -> AccessProfile {
        AccessProfile::new(
            Uuid::new_v4(),
            global,
            memberships
                .iter()
                .map(|(company_id, role)| Membership {
                    company_id: *company_id,
                    role: *role,
                })
                .collect(),
        )
    }

    #[test]
    fn test_codes_round_trip() {
        for role in [
            Role::Superadmin,
            Role::Subadmin,
            Role::CompanyOwner,
            Role::CompanyUser,
            Role::Tenant,
            Role::Buyer,
        ] {
            assert_eq!(Role::from_code(role.code()), Some(role));
        }
        assert_eq!(Role::from_code("xx"), None);
    }

    #[test]
    fn test_parse_accepts_codes_and_names() {
        assert_eq!("cu".parse::<Role>().unwrap(), Role::CompanyUser);
        assert_eq!("Company Owner".parse::<Role>().unwrap(), Role::CompanyOwner);
        assert_eq!("company-user".parse::<Role>().unwrap(), Role::CompanyUser);
        assert!("landlord".parse::<Role>().is_err());
    }

    #[test]
    fn test_deserialize_aliases() {
        let role: Role = serde_json::from_str("\"te\"").unwrap();
        assert_eq!(role, Role::Tenant);
        let role: Role = serde_json::from_str("\"company_owner\"").unwrap();
        assert_eq!(role, Role::CompanyOwner);
    }

    #[test]
    fn test_global_roles() {
        assert!(Role::Superadmin.is_global());
        assert!(Role::Subadmin.is_global());
        assert!(!Role::CompanyOwner.is_global());
        assert!(!Role::Buyer.is_global());
    }

    #[test]
    fn test_company_role_is_never_global_role() {
        let p = profile(Some(Role::CompanyOwner), &[]);
        assert!(p.global_role.is_none());
    }

    #[test]
    fn test_has_role_at_least_ranking() {
        let p = profile(None, &[(1, Role::CompanyUser), (2, Role::Tenant)]);

        assert!(p.has_role_at_least(1, Role::CompanyUser));
        assert!(p.has_role_at_least(1, Role::Tenant));
        assert!(!p.has_role_at_least(1, Role::CompanyOwner));
        assert!(p.has_role_at_least(2, Role::Buyer));
        assert!(!p.has_role_at_least(2, Role::CompanyUser));
        assert!(!p.has_role_at_least(3, Role::Tenant));
    }

    #[test]
    fn test_superadmin_passes_everything() {
        let p = profile(Some(Role::Superadmin), &[]);
        assert!(p.is_superadmin());
        assert!(p.has_role_at_least(42, Role::CompanyOwner));
        assert!(p.can_invite(42));
        assert!(p.can_manage_members(42));
    }

    #[test]
    fn test_subadmin_manages_members_but_cannot_invite() {
        let p = profile(Some(Role::Subadmin), &[]);
        assert!(!p.is_superadmin());
        assert!(p.can_manage_members(7));
        assert!(!p.can_invite(7));
        assert!(p.has_role_at_least(7, Role::CompanyUser));
        assert!(!p.can_manage_company(7));
    }

    #[test]
    fn test_owner_can_invite_only_in_own_company() {
        let p = profile(None, &[(1, Role::CompanyOwner), (2, Role::CompanyUser)]);
        assert!(p.can_invite(1));
        assert!(!p.can_invite(2));
        assert!(p.can_manage_members(1));
        assert!(!p.can_manage_members(2));
    }

    #[test]
    fn test_access_status_for_user() {
        assert_eq!(AccessStatus::for_user(true), AccessStatus::Active);
        assert_eq!(AccessStatus::for_user(false), AccessStatus::Pending);
        assert_eq!(AccessStatus::parse("revoked"), Some(AccessStatus::Revoked));
        assert_eq!(AccessStatus::parse("gone"), None);
    }
}
