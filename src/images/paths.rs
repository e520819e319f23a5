//! Storage paths for uploaded images.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::properties::TargetRef;

/// File extension for an accepted image content type.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// `companies/{company}/{kind plural}/{target id}/{timestamp}_{nonce}.{ext}`
///
/// Objects are grouped per tenant and target. The timestamp has microsecond
/// precision and the nonce covers uploads within the same microsecond.
pub fn object_path(
    company_id: i32,
    target: TargetRef,
    uploaded_at: DateTime<Utc>,
    extension: &str,
) -> String {
    let nonce = &Uuid::new_v4().simple().to_string()[..8];
    format!(
        "companies/{}/{}/{}/{}_{}.{}",
        company_id,
        target.kind.plural(),
        target.id,
        uploaded_at.format("%Y%m%d%H%M%S%6f"),
        nonce,
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::TargetKind;
    use chrono::TimeZone;

    #[test]
    fn test_path_groups_by_company_and_target() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();
        let path = object_path(5, TargetRef::new(TargetKind::Unit, 7), at, "jpg");

        assert!(path.starts_with("companies/5/units/7/20250301123005000000_"));
        assert!(path.ends_with(".jpg"));
    }

    #[test]
    fn test_paths_do_not_collide_at_same_instant() {
        let at = Utc::now();
        let target = TargetRef::new(TargetKind::SubUnit, 1);
        assert_ne!(
            object_path(1, target, at, "png"),
            object_path(1, target, at, "png")
        );
        assert!(object_path(1, target, at, "png").contains("/subunits/1/"));
    }

    #[test]
    fn test_extension_lookup() {
        assert_eq!(extension_for("image/JPEG"), Some("jpg"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("application/pdf"), None);
    }
}
