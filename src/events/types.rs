//! Domain event types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    UserRegistered,
    EmailVerified,
    RegistrationCompleted,
    LoginSuccess,
    LogoutCompleted,

    CompanyCreated,
    CompanyUpdated,

    AccessInvited,
    AccessRoleChanged,
    AccessRevoked,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserRegistered => "user.registered",
            EventType::EmailVerified => "user.email_verified",
            EventType::RegistrationCompleted => "user.registration_completed",
            EventType::LoginSuccess => "auth.login.success",
            EventType::LogoutCompleted => "auth.logout",
            EventType::CompanyCreated => "company.created",
            EventType::CompanyUpdated => "company.updated",
            EventType::AccessInvited => "access.invited",
            EventType::AccessRoleChanged => "access.role_changed",
            EventType::AccessRevoked => "access.revoked",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    User,
    Company,
    Access,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::User => "user",
            AggregateType::Company => "company",
            AggregateType::Access => "access",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub user_id: Option<Uuid>,
    pub company_id: Option<i32>,
    pub request_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            user_id: None,
            company_id: None,
            request_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_company(mut self, company_id: i32) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Carries the verification token so the dispatcher can build the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisteredPayload {
    pub email: String,
    pub full_name: Option<String>,
    pub verification_token: Uuid,
    pub company_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessInvitedPayload {
    pub email: String,
    pub company_id: i32,
    pub company_name: String,
    pub role: String,
    pub invited_by: Uuid,
    /// Present while the invitee still has to verify their address or set a
    /// password.
    pub verification_token: Option<Uuid>,
    pub new_user: bool,
    /// The invitee has no password yet and must go through
    /// complete-registration, whoever created the account.
    #[serde(default)]
    pub needs_password: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessChangedPayload {
    pub user_id: Uuid,
    pub company_id: i32,
    pub role: String,
    pub status: String,
    pub changed_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSuccessPayload {
    pub email: String,
    pub company_id: Option<i32>,
}
