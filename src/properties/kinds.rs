//! Property kinds and the per-kind type vocabularies.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::DomainError;

/// Discriminator for polymorphic references to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Estate,
    Building,
    Unit,
    #[serde(alias = "sub_unit")]
    SubUnit,
}

impl TargetKind {
    pub const ALL: [TargetKind; 4] = [
        TargetKind::Estate,
        TargetKind::Building,
        TargetKind::Unit,
        TargetKind::SubUnit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Estate => "estate",
            TargetKind::Building => "building",
            TargetKind::Unit => "unit",
            TargetKind::SubUnit => "subunit",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            TargetKind::Estate => "estates",
            TargetKind::Building => "buildings",
            TargetKind::Unit => "units",
            TargetKind::SubUnit => "subunits",
        }
    }

    /// Financial transactions attach to estates, buildings and units only.
    pub fn is_finance_target(&self) -> bool {
        !matches!(self, TargetKind::SubUnit)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = DomainError;

    /// Accepts singular and plural forms in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "estate" | "estates" => Ok(TargetKind::Estate),
            "building" | "buildings" => Ok(TargetKind::Building),
            "unit" | "units" => Ok(TargetKind::Unit),
            "subunit" | "subunits" | "sub_unit" | "sub_units" => Ok(TargetKind::SubUnit),
            _ => Err(DomainError::BadRequest(format!(
                "Unknown property kind '{}'",
                s
            ))),
        }
    }
}

/// A `(kind, id)` pair naming one concrete property row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: i32,
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: i32) -> Self {
        Self { kind, id }
    }
}

macro_rules! type_vocabulary {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

type_vocabulary!(EstateType {
    Residential => "residential",
    Commercial => "commercial",
    Mixed => "mixed",
});

type_vocabulary!(BuildingType {
    MultiUnit => "multi_unit",
    SingleUnit => "single_unit",
    Complex => "complex",
});

type_vocabulary!(UnitType {
    Apartment => "apartment",
    House => "house",
    Office => "office",
});

type_vocabulary!(SubUnitType {
    Room => "room",
    Store => "store",
    Office => "office",
});
