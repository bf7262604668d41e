//! Reference catalog entries (campus, course, asset lookups).
//!
//! Catalog tables are plain name lists; a course additionally points at the
//! campus that offers it.

use crate::model::audit::AuditStamp;
use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CatalogId = Uuid;

/// Which reference table an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Campus,
    Course,
    AdmissionMethod,
    AssetType,
    Fragility,
    Condition,
    BrandModel,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 7] = [
        Self::Campus,
        Self::Course,
        Self::AdmissionMethod,
        Self::AssetType,
        Self::Fragility,
        Self::Condition,
        Self::BrandModel,
    ];

    /// Stable storage/CLI identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Campus => "campus",
            Self::Course => "course",
            Self::AdmissionMethod => "admission_method",
            Self::AssetType => "asset_type",
            Self::Fragility => "fragility",
            Self::Condition => "condition",
            Self::BrandModel => "brand_model",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }

    /// Kind the `parent_id` must point at, if this kind takes a parent.
    pub fn parent_kind(self) -> Option<Self> {
        match self {
            Self::Course => Some(Self::Campus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogId,
    pub kind: CatalogKind,
    pub name: String,
    pub parent_id: Option<CatalogId>,
    pub audit: AuditStamp,
}

impl CatalogEntry {
    pub fn new(
        kind: CatalogKind,
        name: impl Into<String>,
        parent_id: Option<CatalogId>,
        actor: Option<UserId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            parent_id,
            audit: AuditStamp::new(actor),
        }
    }
}
