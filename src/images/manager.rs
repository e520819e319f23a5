//! Database side of image attachments.
//!
//! Every mutation of one target's images runs in a transaction holding the
//! target's advisory lock, so the single-primary invariant and the capacity
//! limit hold under concurrent requests. The partial unique index on
//! `(target_kind, target_id) WHERE is_primary` backs this up.

use diesel::prelude::*;
use tracing::{debug, info};

use crate::error::DomainError;
use crate::models::{NewPropertyImage, PropertyImage};
use crate::properties::hierarchy::resolve_target;
use crate::properties::{advisory_lock, image_lock_key, TargetKind, TargetRef};
use crate::schema::property_images;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub path: String,
    pub caption: Option<String>,
    pub requested_primary: bool,
    pub display_order: Option<i32>,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct DeletedImage {
    pub image: PropertyImage,
    pub promoted: Option<PropertyImage>,
}

pub fn check_capacity(current: i64, limit: i64) -> Result<(), DomainError> {
    if current >= limit {
        return Err(DomainError::CapacityExceeded { limit });
    }
    Ok(())
}

pub fn target_of(image: &PropertyImage) -> Result<TargetRef, DomainError> {
    let kind: TargetKind = image.target_kind.parse()?;
    Ok(TargetRef::new(kind, image.target_id))
}

pub fn count_for(conn: &mut PgConnection, target: TargetRef) -> QueryResult<i64> {
    property_images::table
        .filter(property_images::target_kind.eq(target.kind.as_str()))
        .filter(property_images::target_id.eq(target.id))
        .count()
        .get_result(conn)
}

/// Unsets the primary flag on the target's images other than `except`.
fn clear_primary(
    conn: &mut PgConnection,
    target: TargetRef,
    except: Option<i32>,
) -> QueryResult<usize> {
    // Serial ids start at 1, so 0 excludes nothing.
    let others = property_images::table
        .filter(property_images::target_kind.eq(target.kind.as_str()))
        .filter(property_images::target_id.eq(target.id))
        .filter(property_images::is_primary.eq(true))
        .filter(property_images::id.ne(except.unwrap_or(0)));

    diesel::update(others)
        .set((
            property_images::is_primary.eq(false),
            property_images::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
}

fn mark_primary(conn: &mut PgConnection, image_id: i32) -> QueryResult<PropertyImage> {
    diesel::update(property_images::table.find(image_id))
        .set((
            property_images::is_primary.eq(true),
            property_images::updated_at.eq(diesel::dsl::now),
        ))
        .returning(PropertyImage::as_returning())
        .get_result(conn)
}

/// Capacity check outside the lock, used to reject before uploading bytes.
pub fn precheck_upload(
    conn: &mut PgConnection,
    company_id: i32,
    target: TargetRef,
    limit: i64,
) -> Result<(), DomainError> {
    resolve_target(conn, target, company_id)?;
    check_capacity(count_for(conn, target)?, limit)
}

/// Inserts the image row. The first image of a target, or one uploaded with
/// `requested_primary`, becomes the primary.
pub fn insert_image(
    conn: &mut PgConnection,
    company_id: i32,
    target: TargetRef,
    upload: ImageUpload,
    limit: i64,
) -> Result<PropertyImage, DomainError> {
    conn.transaction::<_, DomainError, _>(|conn| {
        advisory_lock(conn, &image_lock_key(target))?;
        resolve_target(conn, target, company_id)?;

        let current = count_for(conn, target)?;
        check_capacity(current, limit)?;

        let make_primary = upload.requested_primary || current == 0;
        if make_primary {
            clear_primary(conn, target, None)?;
        }

        let display_order = upload
            .display_order
            .unwrap_or_else(|| i32::try_from(current).unwrap_or(i32::MAX));

        let image = diesel::insert_into(property_images::table)
            .values(&NewPropertyImage {
                company_id,
                target_kind: target.kind.as_str().to_string(),
                target_id: target.id,
                path: upload.path,
                caption: upload.caption,
                is_primary: make_primary,
                display_order,
                content_type: upload.content_type,
                size_bytes: upload.size_bytes,
            })
            .returning(PropertyImage::as_returning())
            .get_result(conn)?;

        info!(
            image_id = image.id,
            kind = %target.kind,
            target_id = target.id,
            is_primary = image.is_primary,
            "Image attached"
        );
        Ok(image)
    })
}

/// Loads an image and checks its target belongs to the company.
pub fn load_image(
    conn: &mut PgConnection,
    company_id: i32,
    image_id: i32,
) -> Result<PropertyImage, DomainError> {
    let image = property_images::table
        .find(image_id)
        .select(PropertyImage::as_select())
        .first(conn)
        .optional()?
        .ok_or(DomainError::NotFound("Image"))?;

    resolve_target(conn, target_of(&image)?, company_id)?;
    Ok(image)
}

pub fn list_images(
    conn: &mut PgConnection,
    company_id: i32,
    target: TargetRef,
) -> Result<Vec<PropertyImage>, DomainError> {
    resolve_target(conn, target, company_id)?;
    Ok(property_images::table
        .filter(property_images::target_kind.eq(target.kind.as_str()))
        .filter(property_images::target_id.eq(target.id))
        .order((property_images::display_order.asc(), property_images::id.asc()))
        .select(PropertyImage::as_select())
        .load(conn)?)
}

/// Makes the image its target's primary. Calling it on the current primary
/// succeeds without changes.
pub fn set_primary(
    conn: &mut PgConnection,
    company_id: i32,
    image_id: i32,
) -> Result<PropertyImage, DomainError> {
    let image = load_image(conn, company_id, image_id)?;
    let target = target_of(&image)?;

    conn.transaction::<_, DomainError, _>(|conn| {
        advisory_lock(conn, &image_lock_key(target))?;

        let current: PropertyImage = property_images::table
            .find(image_id)
            .select(PropertyImage::as_select())
            .first(conn)
            .optional()?
            .ok_or(DomainError::NotFound("Image"))?;

        let cleared = clear_primary(conn, target, Some(image_id))?;
        if current.is_primary && cleared == 0 {
            debug!(image_id, "Image already primary");
            return Ok(current);
        }

        let updated = mark_primary(conn, image_id)?;
        info!(image_id, kind = %target.kind, target_id = target.id, "Primary image changed");
        Ok(updated)
    })
}

pub fn update_image(
    conn: &mut PgConnection,
    company_id: i32,
    image_id: i32,
    caption: Option<Option<String>>,
    display_order: Option<i32>,
) -> Result<PropertyImage, DomainError> {
    let image = load_image(conn, company_id, image_id)?;
    if caption.is_none() && display_order.is_none() {
        return Ok(image);
    }

    let caption = caption.unwrap_or(image.caption);
    let display_order = display_order.unwrap_or(image.display_order);

    Ok(diesel::update(property_images::table.find(image_id))
        .set((
            property_images::caption.eq(caption),
            property_images::display_order.eq(display_order),
            property_images::updated_at.eq(diesel::dsl::now),
        ))
        .returning(PropertyImage::as_returning())
        .get_result(conn)?)
}

/// Removes the row. When it was the primary, the first remaining sibling by
/// `(display_order, id)` is promoted.
pub fn delete_image(
    conn: &mut PgConnection,
    company_id: i32,
    image_id: i32,
) -> Result<DeletedImage, DomainError> {
    let image = load_image(conn, company_id, image_id)?;
    let target = target_of(&image)?;

    conn.transaction::<_, DomainError, _>(|conn| {
        advisory_lock(conn, &image_lock_key(target))?;

        let removed: PropertyImage = diesel::delete(property_images::table.find(image_id))
            .returning(PropertyImage::as_returning())
            .get_result(conn)
            .optional()?
            .ok_or(DomainError::NotFound("Image"))?;

        let promoted = if removed.is_primary {
            let successor: Option<i32> = property_images::table
                .filter(property_images::target_kind.eq(target.kind.as_str()))
                .filter(property_images::target_id.eq(target.id))
                .order((property_images::display_order.asc(), property_images::id.asc()))
                .select(property_images::id)
                .first(conn)
                .optional()?;
            successor.map(|id| mark_primary(conn, id)).transpose()?
        } else {
            None
        };

        info!(
            image_id,
            kind = %target.kind,
            target_id = target.id,
            promoted = ?promoted.as_ref().map(|p| p.id),
            "Image removed"
        );
        Ok(DeletedImage {
            image: removed,
            promoted,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_boundary() {
        assert!(check_capacity(0, 50).is_ok());
        assert!(check_capacity(49, 50).is_ok());
        assert!(matches!(
            check_capacity(50, 50),
            Err(DomainError::CapacityExceeded { limit: 50 })
        ));
        assert!(check_capacity(51, 50).is_err());
    }

    #[test]
    fn test_unknown_stored_kind_is_rejected() {
        let now = chrono::Utc::now().naive_utc();
        let image = PropertyImage {
            id: 1,
            company_id: 1,
            target_kind: "garage".to_string(),
            target_id: 1,
            path: "x".to_string(),
            caption: None,
            is_primary: true,
            display_order: 0,
            content_type: "image/png".to_string(),
            size_bytes: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(target_of(&image), Err(DomainError::BadRequest(_))));
    }
}
