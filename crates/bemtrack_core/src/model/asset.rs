//! Physical asset (bem) record.

use crate::model::audit::AuditStamp;
use crate::model::catalog::CatalogId;
use crate::model::user::UserId;
use crate::model::validation::{optional_text, require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AssetId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetInput {
    /// Institution asset tag. Unique.
    pub patrimonio: String,
    pub description: String,
    pub serial_number: Option<String>,
    pub asset_type_id: CatalogId,
    pub fragility_id: CatalogId,
    pub condition_id: CatalogId,
    pub brand_model_id: CatalogId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub patrimonio: String,
    pub description: String,
    pub serial_number: Option<String>,
    pub asset_type_id: CatalogId,
    pub fragility_id: CatalogId,
    pub condition_id: CatalogId,
    pub brand_model_id: CatalogId,
    pub audit: AuditStamp,
}

impl Asset {
    pub fn from_input(input: &AssetInput, actor: UserId) -> Result<Self, ValidationError> {
        let mut asset = Self {
            id: Uuid::new_v4(),
            patrimonio: String::new(),
            description: String::new(),
            serial_number: None,
            asset_type_id: input.asset_type_id,
            fragility_id: input.fragility_id,
            condition_id: input.condition_id,
            brand_model_id: input.brand_model_id,
            audit: AuditStamp::new(Some(actor)),
        };
        asset.apply(input)?;
        Ok(asset)
    }

    /// Replaces all editable fields. Leaves `self` untouched on error.
    pub fn apply(&mut self, input: &AssetInput) -> Result<(), ValidationError> {
        let patrimonio = require_text("patrimonio", &input.patrimonio)?;
        let description = require_text("description", &input.description)?;

        self.patrimonio = patrimonio;
        self.description = description;
        self.serial_number = optional_text(input.serial_number.as_deref());
        self.asset_type_id = input.asset_type_id;
        self.fragility_id = input.fragility_id;
        self.condition_id = input.condition_id;
        self.brand_model_id = input.brand_model_id;
        Ok(())
    }
}
