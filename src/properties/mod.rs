//! The property hierarchy: estates, buildings, units and sub-units.

pub mod hierarchy;
pub mod kinds;

use diesel::prelude::*;
use diesel::sql_types::Text;

pub use kinds::{BuildingType, EstateType, SubUnitType, TargetKind, TargetRef, UnitType};

/// Takes a transaction-scoped advisory lock keyed by `key`.
///
/// Must be called inside a transaction; the lock is released on commit or
/// rollback.
pub fn advisory_lock(conn: &mut PgConnection, key: &str) -> QueryResult<()> {
    diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind::<Text, _>(key)
        .execute(conn)?;
    Ok(())
}

pub fn building_lock_key(building_id: i32) -> String {
    format!("building:{}", building_id)
}

/// Serializes every image mutation of one target.
pub fn image_lock_key(target: TargetRef) -> String {
    format!("img:{}:{}", target.kind.as_str(), target.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_keys_are_distinct_per_kind() {
        assert_eq!(
            image_lock_key(TargetRef::new(TargetKind::Unit, 7)),
            "img:unit:7"
        );
        assert_ne!(
            image_lock_key(TargetRef::new(TargetKind::Unit, 7)),
            image_lock_key(TargetRef::new(TargetKind::Building, 7))
        );
        assert_eq!(building_lock_key(3), "building:3");
    }
}
