//! Multi-company tenancy: roles, memberships and current-company resolution.

pub mod access;
pub mod context;
pub mod membership;
pub mod roles;

pub use context::{CompanySnapshot, Outcome, Resolution, SessionRecord, SessionSlot};
pub use roles::{AccessProfile, AccessStatus, Membership, Role};
