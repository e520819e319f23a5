//! Current-company resolution over an explicit session record.
//!
//! Everything here is pure: callers load the session and the user's
//! reachable companies, call [`resolve`], and persist the returned record
//! when [`Resolution::changed`] is set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CompanySnapshot {
    #[schema(example = 5)]
    pub id: i32,
    #[schema(example = "Acme Properties")]
    pub name: String,
}

/// A session value that has been computed. `Empty` records "computed as
/// none"; a missing key (`None` on the record) means "not computed yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum SessionSlot<T> {
    Empty,
    Filled(T),
}

impl<T> SessionSlot<T> {
    pub fn filled(&self) -> Option<&T> {
        match self {
            SessionSlot::Filled(value) => Some(value),
            SessionSlot::Empty => None,
        }
    }
}

impl<T> From<Option<T>> for SessionSlot<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => SessionSlot::Filled(v),
            None => SessionSlot::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<SessionSlot<CompanySnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_company_id: Option<SessionSlot<i32>>,
    /// Set out of band when someone changed this user's access.
    #[serde(default)]
    pub refresh_company: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            company: None,
            current_company_id: None,
            refresh_company: false,
            created_at: Utc::now(),
        }
    }

    pub fn current_company(&self) -> Option<&CompanySnapshot> {
        self.company.as_ref().and_then(SessionSlot::filled)
    }

    fn pointer(&self) -> Option<i32> {
        self.current_company_id
            .as_ref()
            .and_then(SessionSlot::filled)
            .copied()
    }

    fn store(&mut self, chosen: Option<&CompanySnapshot>) {
        self.company = Some(chosen.cloned().into());
        self.current_company_id = Some(chosen.map(|c| c.id).into());
        self.refresh_company = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The stored snapshot was still valid.
    Cached,
    /// The snapshot was missing, stale or flagged and has been recomputed.
    Refreshed,
    /// The user has no reachable company.
    NoCompany,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Cached => "cached",
            Outcome::Refreshed => "refreshed",
            Outcome::NoCompany => "no_company",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: Outcome,
    pub session: SessionRecord,
    pub changed: bool,
}

impl Resolution {
    pub fn company(&self) -> Result<&CompanySnapshot, DomainError> {
        self.session.current_company().ok_or(DomainError::NoCompany)
    }
}

/// Deterministic choice: the preferred id when it is still reachable,
/// otherwise the lowest company id.
pub fn select_company(
    accessible: &[CompanySnapshot],
    preferred: Option<i32>,
) -> Option<&CompanySnapshot> {
    preferred
        .and_then(|id| accessible.iter().find(|c| c.id == id))
        .or_else(|| accessible.iter().min_by_key(|c| c.id))
}

/// Fills the session right after authentication.
pub fn on_login(session: &mut SessionRecord, accessible: &[CompanySnapshot]) -> Outcome {
    let chosen = select_company(accessible, None);
    session.store(chosen);
    if chosen.is_some() {
        Outcome::Refreshed
    } else {
        Outcome::NoCompany
    }
}

pub fn resolve(
    session: &SessionRecord,
    refresh_requested: bool,
    accessible: &[CompanySnapshot],
) -> Resolution {
    let refresh = refresh_requested || session.refresh_company;

    if !refresh {
        if let (Some(snapshot), Some(pointer)) = (session.current_company(), session.pointer()) {
            if snapshot.id == pointer {
                if let Some(live) = accessible.iter().find(|c| c.id == pointer) {
                    let mut next = session.clone();
                    next.store(Some(live));
                    let changed = next != *session;
                    return Resolution {
                        outcome: Outcome::Cached,
                        session: next,
                        changed,
                    };
                }
            }
        }
    }

    let mut next = session.clone();
    let chosen = select_company(accessible, session.pointer());
    next.store(chosen);
    let changed = next != *session;

    Resolution {
        outcome: if chosen.is_some() {
            Outcome::Refreshed
        } else {
            Outcome::NoCompany
        },
        session: next,
        changed,
    }
}

/// Explicit re-selection. Fails unless the company is reachable.
pub fn switch_company(
    session: &mut SessionRecord,
    company_id: i32,
    accessible: &[CompanySnapshot],
) -> Result<CompanySnapshot, DomainError> {
    let target = accessible
        .iter()
        .find(|c| c.id == company_id)
        .ok_or_else(|| DomainError::forbidden("You do not have access to this company."))?;
    session.store(Some(target));
    Ok(target.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: i32, name: &str) -> CompanySnapshot {
        CompanySnapshot {
            id,
            name: name.to_string(),
        }
    }

    fn session_pointing_at(id: i32, name: &str) -> SessionRecord {
        let mut s = SessionRecord::new(Uuid::new_v4());
        s.company = Some(SessionSlot::Filled(company(id, name)));
        s.current_company_id = Some(SessionSlot::Filled(id));
        s
    }

    #[test]
    fn test_login_picks_lowest_id() {
        let mut s = SessionRecord::new(Uuid::new_v4());
        let outcome = on_login(&mut s, &[company(9, "Nine"), company(3, "Three")]);

        assert_eq!(outcome, Outcome::Refreshed);
        assert_eq!(s.current_company(), Some(&company(3, "Three")));
        assert_eq!(s.current_company_id, Some(SessionSlot::Filled(3)));
    }

    #[test]
    fn test_login_without_companies_stores_explicit_none() {
        let mut s = SessionRecord::new(Uuid::new_v4());
        let outcome = on_login(&mut s, &[]);

        assert_eq!(outcome, Outcome::NoCompany);
        assert_eq!(s.company, Some(SessionSlot::Empty));
        assert_eq!(s.current_company_id, Some(SessionSlot::Empty));
    }

    #[test]
    fn test_valid_snapshot_is_cached_and_unchanged() {
        let s = session_pointing_at(5, "Acme");
        let r = resolve(&s, false, &[company(2, "Other"), company(5, "Acme")]);

        assert_eq!(r.outcome, Outcome::Cached);
        assert!(!r.changed);
        assert_eq!(r.company().unwrap().id, 5);
    }

    #[test]
    fn test_cached_snapshot_picks_up_renamed_company() {
        let s = session_pointing_at(5, "Acme");
        let r = resolve(&s, false, &[company(5, "Acme Holdings")]);

        assert_eq!(r.outcome, Outcome::Cached);
        assert!(r.changed);
        assert_eq!(r.company().unwrap().name, "Acme Holdings");
    }

    #[test]
    fn test_stale_pointer_falls_back_to_current_company() {
        let s = session_pointing_at(999, "Deleted");
        let r = resolve(&s, false, &[company(5, "Acme")]);

        assert_eq!(r.outcome, Outcome::Refreshed);
        assert!(r.changed);
        assert_eq!(r.company().unwrap().id, 5);
        assert_eq!(r.session.current_company_id, Some(SessionSlot::Filled(5)));
    }

    #[test]
    fn test_missing_session_keys_are_computed() {
        let s = SessionRecord::new(Uuid::new_v4());
        let r = resolve(&s, false, &[company(8, "B"), company(4, "A")]);

        assert_eq!(r.outcome, Outcome::Refreshed);
        assert_eq!(r.company().unwrap().id, 4);
    }

    #[test]
    fn test_mismatched_snapshot_and_pointer_is_recomputed() {
        let mut s = session_pointing_at(5, "Acme");
        s.current_company_id = Some(SessionSlot::Filled(6));
        let r = resolve(&s, false, &[company(5, "Acme"), company(6, "Six")]);

        assert_eq!(r.outcome, Outcome::Refreshed);
        assert_eq!(r.company().unwrap().id, 6);
    }

    #[test]
    fn test_refresh_flag_bypasses_cache_and_is_cleared() {
        let mut s = session_pointing_at(5, "Acme");
        s.refresh_company = true;
        let r = resolve(&s, false, &[company(2, "Two")]);

        assert_eq!(r.outcome, Outcome::Refreshed);
        assert_eq!(r.company().unwrap().id, 2);
        assert!(!r.session.refresh_company);
    }

    #[test]
    fn test_refresh_request_keeps_still_valid_pointer() {
        let s = session_pointing_at(5, "Acme");
        let r = resolve(&s, true, &[company(2, "Two"), company(5, "Acme")]);

        assert_eq!(r.outcome, Outcome::Refreshed);
        assert_eq!(r.company().unwrap().id, 5);
    }

    #[test]
    fn test_no_companies_yields_no_company_error() {
        let s = session_pointing_at(5, "Acme");
        let r = resolve(&s, false, &[]);

        assert_eq!(r.outcome, Outcome::NoCompany);
        assert_eq!(r.session.company, Some(SessionSlot::Empty));
        assert!(matches!(r.company(), Err(DomainError::NoCompany)));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let s = session_pointing_at(999, "Deleted");
        let accessible = [company(5, "Acme"), company(7, "Seven")];
        let first = resolve(&s, false, &accessible);
        let second = resolve(&first.session, false, &accessible);

        assert_eq!(second.outcome, Outcome::Cached);
        assert!(!second.changed);
        assert_eq!(first.session, second.session);
    }

    #[test]
    fn test_switch_rejects_unreachable_company() {
        let mut s = session_pointing_at(5, "Acme");
        let err = switch_company(&mut s, 9, &[company(5, "Acme")]).unwrap_err();

        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(s.current_company().unwrap().id, 5);
    }

    #[test]
    fn test_switch_updates_both_keys() {
        let mut s = session_pointing_at(5, "Acme");
        let chosen = switch_company(&mut s, 7, &[company(5, "Acme"), company(7, "Seven")]).unwrap();

        assert_eq!(chosen.id, 7);
        assert_eq!(s.current_company_id, Some(SessionSlot::Filled(7)));
    }

    #[test]
    fn test_session_serialization_distinguishes_empty_from_missing() {
        let mut s = SessionRecord::new(Uuid::new_v4());
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("company").is_none());

        on_login(&mut s, &[]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["company"]["state"], "empty");

        let back: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.company, Some(SessionSlot::Empty));
    }
}
