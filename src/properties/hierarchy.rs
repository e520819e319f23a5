//! Estates, buildings, units and sub-units with their save-time rules.

use std::collections::HashMap;

use diesel::prelude::*;
use tracing::{debug, info};

use crate::error::DomainError;
use crate::models::{
    Building, Estate, NewBuilding, NewEstate, NewSubUnit, NewUnit, SubUnit, Unit,
};
use crate::pagination::PaginationParams;
use crate::schema::{
    buildings, estates, financial_transactions, property_images, property_purchases,
    recurring_transactions, sub_units, units,
};

use super::kinds::{BuildingType, EstateType, SubUnitType, TargetKind, TargetRef, UnitType};
use super::{advisory_lock, building_lock_key, image_lock_key};

const SINGLE_UNIT_NUMBER: &str = "1";

/// Company owning the referenced row, if the row exists.
pub fn owner_company(conn: &mut PgConnection, target: TargetRef) -> QueryResult<Option<i32>> {
    match target.kind {
        TargetKind::Estate => estates::table
            .find(target.id)
            .select(estates::company_id)
            .first(conn)
            .optional(),
        TargetKind::Building => buildings::table
            .find(target.id)
            .select(buildings::company_id)
            .first(conn)
            .optional(),
        TargetKind::Unit => units::table
            .find(target.id)
            .select(units::company_id)
            .first(conn)
            .optional(),
        TargetKind::SubUnit => sub_units::table
            .find(target.id)
            .select(sub_units::company_id)
            .first(conn)
            .optional(),
    }
}

fn label(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Estate => "Estate",
        TargetKind::Building => "Building",
        TargetKind::Unit => "Unit",
        TargetKind::SubUnit => "Sub-unit",
    }
}

/// Checks the target exists and belongs to `company_id`. A row owned by
/// another company is an authorization failure, not a missing row.
pub fn resolve_target(
    conn: &mut PgConnection,
    target: TargetRef,
    company_id: i32,
) -> Result<(), DomainError> {
    match owner_company(conn, target)? {
        None => Err(DomainError::NotFound(label(target.kind))),
        Some(owner) if owner != company_id => Err(DomainError::forbidden(
            "This property belongs to another company.",
        )),
        Some(_) => Ok(()),
    }
}

/// Like [`resolve_target`], but reports problems against a form field.
fn require_parent(
    conn: &mut PgConnection,
    target: TargetRef,
    company_id: i32,
    field: &'static str,
) -> Result<(), DomainError> {
    resolve_target(conn, target, company_id).map_err(|err| match err {
        DomainError::NotFound(what) => DomainError::validation(field, format!("{} not found.", what)),
        DomainError::Forbidden(_) => DomainError::validation(
            field,
            format!("{} does not belong to the current company.", label(target.kind)),
        ),
        other => other,
    })
}

/// Unit rules per building type. `existing_units` is the number of units
/// already in the building.
pub fn check_unit_rules(
    building_type: BuildingType,
    unit_type: UnitType,
    existing_units: i64,
) -> Result<(), DomainError> {
    match building_type {
        BuildingType::SingleUnit if existing_units > 0 => Err(DomainError::validation(
            "building_id",
            "A single-unit building already has its unit.",
        )),
        BuildingType::SingleUnit if unit_type != UnitType::House => Err(DomainError::validation(
            "unit_type",
            "Single-unit buildings can only contain a house.",
        )),
        BuildingType::MultiUnit if unit_type != UnitType::Apartment => Err(
            DomainError::validation("unit_type", "Multi-unit buildings can only contain apartments."),
        ),
        _ => Ok(()),
    }
}

pub fn create_estate(
    conn: &mut PgConnection,
    company_id: i32,
    name: String,
    estate_type: EstateType,
    address: Option<String>,
) -> Result<Estate, DomainError> {
    let estate = diesel::insert_into(estates::table)
        .values(&NewEstate {
            company_id,
            name,
            estate_type: estate_type.as_str().to_string(),
            address,
        })
        .returning(Estate::as_returning())
        .get_result(conn)?;

    info!(estate_id = estate.id, company_id, "Estate created");
    Ok(estate)
}

/// Creates a building. A single-unit building gets its house unit in the
/// same transaction.
pub fn create_building(
    conn: &mut PgConnection,
    company_id: i32,
    estate_id: Option<i32>,
    name: String,
    building_type: BuildingType,
    address: Option<String>,
) -> Result<(Building, Option<Unit>), DomainError> {
    if let Some(estate_id) = estate_id {
        require_parent(
            conn,
            TargetRef::new(TargetKind::Estate, estate_id),
            company_id,
            "estate_id",
        )?;
    }

    conn.transaction::<_, DomainError, _>(|conn| {
        let building = diesel::insert_into(buildings::table)
            .values(&NewBuilding {
                company_id,
                estate_id,
                name,
                building_type: building_type.as_str().to_string(),
                address,
            })
            .returning(Building::as_returning())
            .get_result(conn)?;

        let unit = if building_type == BuildingType::SingleUnit {
            Some(
                diesel::insert_into(units::table)
                    .values(&NewUnit {
                        company_id,
                        building_id: building.id,
                        number: SINGLE_UNIT_NUMBER.to_string(),
                        unit_type: UnitType::House.as_str().to_string(),
                    })
                    .returning(Unit::as_returning())
                    .get_result(conn)?,
            )
        } else {
            None
        };

        info!(building_id = building.id, company_id, building_type = building_type.as_str(), "Building created");
        Ok((building, unit))
    })
}

pub fn create_unit(
    conn: &mut PgConnection,
    company_id: i32,
    building_id: i32,
    number: String,
    unit_type: UnitType,
) -> Result<Unit, DomainError> {
    require_parent(
        conn,
        TargetRef::new(TargetKind::Building, building_id),
        company_id,
        "building_id",
    )?;

    let number = number.trim().to_string();
    if number.is_empty() {
        return Err(DomainError::validation("number", "Unit number is required."));
    }

    conn.transaction::<_, DomainError, _>(|conn| {
        advisory_lock(conn, &building_lock_key(building_id))?;

        let building_type: String = buildings::table
            .find(building_id)
            .select(buildings::building_type)
            .first(conn)?;
        let building_type = BuildingType::parse(&building_type).ok_or_else(|| {
            diesel::result::Error::DeserializationError(
                format!("unknown building type '{}'", building_type).into(),
            )
        })?;

        let existing: i64 = units::table
            .filter(units::building_id.eq(building_id))
            .count()
            .get_result(conn)?;

        check_unit_rules(building_type, unit_type, existing)?;

        let taken: i64 = units::table
            .filter(units::building_id.eq(building_id))
            .filter(units::number.eq(&number))
            .count()
            .get_result(conn)?;
        if taken > 0 {
            return Err(DomainError::validation(
                "number",
                "A unit with this number already exists in the building.",
            ));
        }

        let unit = diesel::insert_into(units::table)
            .values(&NewUnit {
                company_id,
                building_id,
                number,
                unit_type: unit_type.as_str().to_string(),
            })
            .returning(Unit::as_returning())
            .get_result(conn)?;

        info!(unit_id = unit.id, building_id, company_id, "Unit created");
        Ok(unit)
    })
}

pub fn create_sub_unit(
    conn: &mut PgConnection,
    company_id: i32,
    unit_id: i32,
    name: String,
    sub_unit_type: SubUnitType,
) -> Result<SubUnit, DomainError> {
    require_parent(
        conn,
        TargetRef::new(TargetKind::Unit, unit_id),
        company_id,
        "unit_id",
    )?;

    let sub_unit = diesel::insert_into(sub_units::table)
        .values(&NewSubUnit {
            company_id,
            unit_id,
            name,
            sub_unit_type: sub_unit_type.as_str().to_string(),
        })
        .returning(SubUnit::as_returning())
        .get_result(conn)?;

    info!(sub_unit_id = sub_unit.id, unit_id, company_id, "Sub-unit created");
    Ok(sub_unit)
}

pub fn list_estates(
    conn: &mut PgConnection,
    company_id: i32,
    pagination: &PaginationParams,
) -> QueryResult<(Vec<Estate>, i64)> {
    let (limit, offset) = pagination.limit_offset();
    let total = estates::table
        .filter(estates::company_id.eq(company_id))
        .count()
        .get_result(conn)?;
    let rows = estates::table
        .filter(estates::company_id.eq(company_id))
        .order(estates::id.asc())
        .limit(limit)
        .offset(offset)
        .select(Estate::as_select())
        .load(conn)?;
    Ok((rows, total))
}

pub fn list_buildings(
    conn: &mut PgConnection,
    company_id: i32,
    estate_id: Option<i32>,
    pagination: &PaginationParams,
) -> QueryResult<(Vec<Building>, i64)> {
    let (limit, offset) = pagination.limit_offset();

    let mut count_query = buildings::table
        .filter(buildings::company_id.eq(company_id))
        .into_boxed();
    let mut query = buildings::table
        .filter(buildings::company_id.eq(company_id))
        .into_boxed();
    if let Some(estate_id) = estate_id {
        count_query = count_query.filter(buildings::estate_id.eq(estate_id));
        query = query.filter(buildings::estate_id.eq(estate_id));
    }

    let total = count_query.count().get_result(conn)?;
    let rows = query
        .order(buildings::id.asc())
        .limit(limit)
        .offset(offset)
        .select(Building::as_select())
        .load(conn)?;
    Ok((rows, total))
}

pub fn list_units(
    conn: &mut PgConnection,
    company_id: i32,
    building_id: Option<i32>,
    pagination: &PaginationParams,
) -> QueryResult<(Vec<Unit>, i64)> {
    let (limit, offset) = pagination.limit_offset();

    let mut count_query = units::table
        .filter(units::company_id.eq(company_id))
        .into_boxed();
    let mut query = units::table
        .filter(units::company_id.eq(company_id))
        .into_boxed();
    if let Some(building_id) = building_id {
        count_query = count_query.filter(units::building_id.eq(building_id));
        query = query.filter(units::building_id.eq(building_id));
    }

    let total = count_query.count().get_result(conn)?;
    let rows = query
        .order((units::building_id.asc(), units::number.asc()))
        .limit(limit)
        .offset(offset)
        .select(Unit::as_select())
        .load(conn)?;
    Ok((rows, total))
}

pub fn list_sub_units(
    conn: &mut PgConnection,
    company_id: i32,
    unit_id: Option<i32>,
    pagination: &PaginationParams,
) -> QueryResult<(Vec<SubUnit>, i64)> {
    let (limit, offset) = pagination.limit_offset();

    let mut count_query = sub_units::table
        .filter(sub_units::company_id.eq(company_id))
        .into_boxed();
    let mut query = sub_units::table
        .filter(sub_units::company_id.eq(company_id))
        .into_boxed();
    if let Some(unit_id) = unit_id {
        count_query = count_query.filter(sub_units::unit_id.eq(unit_id));
        query = query.filter(sub_units::unit_id.eq(unit_id));
    }

    let total = count_query.count().get_result(conn)?;
    let rows = query
        .order(sub_units::id.asc())
        .limit(limit)
        .offset(offset)
        .select(SubUnit::as_select())
        .load(conn)?;
    Ok((rows, total))
}

pub fn get_estate(conn: &mut PgConnection, company_id: i32, id: i32) -> Result<Estate, DomainError> {
    resolve_target(conn, TargetRef::new(TargetKind::Estate, id), company_id)?;
    Ok(estates::table.find(id).select(Estate::as_select()).first(conn)?)
}

pub fn get_building(
    conn: &mut PgConnection,
    company_id: i32,
    id: i32,
) -> Result<Building, DomainError> {
    resolve_target(conn, TargetRef::new(TargetKind::Building, id), company_id)?;
    Ok(buildings::table.find(id).select(Building::as_select()).first(conn)?)
}

pub fn get_unit(conn: &mut PgConnection, company_id: i32, id: i32) -> Result<Unit, DomainError> {
    resolve_target(conn, TargetRef::new(TargetKind::Unit, id), company_id)?;
    Ok(units::table.find(id).select(Unit::as_select()).first(conn)?)
}

pub fn get_sub_unit(
    conn: &mut PgConnection,
    company_id: i32,
    id: i32,
) -> Result<SubUnit, DomainError> {
    resolve_target(conn, TargetRef::new(TargetKind::SubUnit, id), company_id)?;
    Ok(sub_units::table.find(id).select(SubUnit::as_select()).first(conn)?)
}

/// The target itself followed by every row below it in the hierarchy.
fn subtree(conn: &mut PgConnection, root: TargetRef) -> QueryResult<Vec<TargetRef>> {
    let mut building_ids = Vec::new();
    let mut unit_ids = Vec::new();

    match root.kind {
        TargetKind::Estate => {
            building_ids = buildings::table
                .filter(buildings::estate_id.eq(root.id))
                .select(buildings::id)
                .load(conn)?;
        }
        TargetKind::Building => building_ids.push(root.id),
        TargetKind::Unit => unit_ids.push(root.id),
        TargetKind::SubUnit => return Ok(vec![root]),
    }

    if !building_ids.is_empty() {
        let found: Vec<i32> = units::table
            .filter(units::building_id.eq_any(&building_ids))
            .select(units::id)
            .load(conn)?;
        unit_ids.extend(found);
    }

    let sub_unit_ids: Vec<i32> = if unit_ids.is_empty() {
        Vec::new()
    } else {
        sub_units::table
            .filter(sub_units::unit_id.eq_any(&unit_ids))
            .select(sub_units::id)
            .load(conn)?
    };

    let mut refs = vec![root];
    let children = building_ids
        .into_iter()
        .map(|id| TargetRef::new(TargetKind::Building, id))
        .chain(unit_ids.into_iter().map(|id| TargetRef::new(TargetKind::Unit, id)))
        .chain(
            sub_unit_ids
                .into_iter()
                .map(|id| TargetRef::new(TargetKind::SubUnit, id)),
        )
        .filter(|r| *r != root);
    refs.extend(children);
    Ok(refs)
}

/// Image lock keys for every target in `refs`, sorted so that overlapping
/// deletes acquire them in the same order.
fn subtree_lock_keys(refs: &[TargetRef]) -> Vec<String> {
    let mut keys: Vec<String> = refs.iter().map(|r| image_lock_key(*r)).collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Deletes a property, its descendants and everything attached to them.
///
/// Every target in the subtree is image-locked before its images are removed,
/// so an upload to a descendant either commits first and is swept up, or
/// waits and then finds its target gone.
///
/// Returns the storage paths of the removed images; the caller deletes the
/// stored objects after the transaction commits.
pub fn delete_property(
    conn: &mut PgConnection,
    company_id: i32,
    target: TargetRef,
) -> Result<Vec<String>, DomainError> {
    resolve_target(conn, target, company_id)?;

    conn.transaction::<_, DomainError, _>(|conn| {
        let refs = subtree(conn, target)?;
        for key in subtree_lock_keys(&refs) {
            advisory_lock(conn, &key)?;
        }
        let mut by_kind: HashMap<TargetKind, Vec<i32>> = HashMap::new();
        for r in &refs {
            by_kind.entry(r.kind).or_default().push(r.id);
        }

        let mut paths = Vec::new();
        for (kind, ids) in &by_kind {
            let removed: Vec<String> = diesel::delete(
                property_images::table
                    .filter(property_images::target_kind.eq(kind.as_str()))
                    .filter(property_images::target_id.eq_any(ids)),
            )
            .returning(property_images::path)
            .get_results(conn)?;
            paths.extend(removed);

            if kind.is_finance_target() {
                diesel::delete(
                    financial_transactions::table
                        .filter(financial_transactions::target_kind.eq(kind.as_str()))
                        .filter(financial_transactions::target_id.eq_any(ids)),
                )
                .execute(conn)?;
                diesel::delete(
                    recurring_transactions::table
                        .filter(recurring_transactions::target_kind.eq(kind.as_str()))
                        .filter(recurring_transactions::target_id.eq_any(ids)),
                )
                .execute(conn)?;
                diesel::delete(
                    property_purchases::table
                        .filter(property_purchases::target_kind.eq(kind.as_str()))
                        .filter(property_purchases::target_id.eq_any(ids)),
                )
                .execute(conn)?;
            }
        }

        match target.kind {
            TargetKind::Estate => diesel::delete(estates::table.find(target.id)).execute(conn)?,
            TargetKind::Building => {
                diesel::delete(buildings::table.find(target.id)).execute(conn)?
            }
            TargetKind::Unit => diesel::delete(units::table.find(target.id)).execute(conn)?,
            TargetKind::SubUnit => {
                diesel::delete(sub_units::table.find(target.id)).execute(conn)?
            }
        };

        debug!(descendants = refs.len() - 1, images = paths.len(), "Property subtree removed");
        info!(kind = %target.kind, id = target.id, company_id, "Property deleted");
        Ok(paths)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_lock_keys_cover_every_target_once_in_order() {
        let refs = [
            TargetRef::new(TargetKind::Estate, 3),
            TargetRef::new(TargetKind::Unit, 12),
            TargetRef::new(TargetKind::Building, 5),
            TargetRef::new(TargetKind::Unit, 12),
            TargetRef::new(TargetKind::SubUnit, 40),
        ];

        let keys = subtree_lock_keys(&refs);

        assert_eq!(
            keys,
            vec![
                "img:building:5".to_string(),
                "img:estate:3".to_string(),
                "img:subunit:40".to_string(),
                "img:unit:12".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_unit_building_accepts_only_one_house() {
        assert!(check_unit_rules(BuildingType::SingleUnit, UnitType::House, 0).is_ok());

        let err = check_unit_rules(BuildingType::SingleUnit, UnitType::House, 1).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation {
                field: Some("building_id"),
                ..
            }
        ));

        let err = check_unit_rules(BuildingType::SingleUnit, UnitType::Apartment, 0).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation {
                field: Some("unit_type"),
                ..
            }
        ));
    }

    #[test]
    fn test_multi_unit_building_accepts_only_apartments() {
        assert!(check_unit_rules(BuildingType::MultiUnit, UnitType::Apartment, 12).is_ok());
        assert!(check_unit_rules(BuildingType::MultiUnit, UnitType::Office, 0).is_err());
        assert!(check_unit_rules(BuildingType::MultiUnit, UnitType::House, 0).is_err());
    }

    #[test]
    fn test_complex_accepts_anything() {
        for unit_type in [UnitType::Apartment, UnitType::House, UnitType::Office] {
            assert!(check_unit_rules(BuildingType::Complex, unit_type, 40).is_ok());
        }
    }
}
