//! Asset (bem) use-cases.
//!
//! # Invariants
//! - `patrimonio` is unique across live and removed assets.
//! - An asset out on an active loan cannot be removed.

use crate::model::asset::{Asset, AssetId, AssetInput};
use crate::model::catalog::CatalogKind;
use crate::model::EntityKind;
use crate::policy::{Action, Actor, Policy, Resource, RolePolicy};
use crate::repo::asset_repo::AssetRepository;
use crate::repo::ListQuery;
use crate::service::{ensure_catalog_ref, observe, StateViolation, UseCaseError, UseCaseResult};

pub struct AssetService<R: AssetRepository, P: Policy = RolePolicy> {
    repo: R,
    policy: P,
}

impl<R: AssetRepository> AssetService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, RolePolicy::for_resource(Resource::Asset))
    }
}

impl<R: AssetRepository, P: Policy> AssetService<R, P> {
    pub fn with_policy(repo: R, policy: P) -> Self {
        Self { repo, policy }
    }

    /// Lists assets ordered by `patrimonio`.
    pub fn list(&self, actor: &Actor, query: &ListQuery) -> UseCaseResult<Vec<Asset>> {
        observe("asset_list", "asset", || {
            self.policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_assets(query)?)
        })
    }

    pub fn get(&self, actor: &Actor, id: AssetId, include_deleted: bool) -> UseCaseResult<Asset> {
        observe("asset_get", "asset", || {
            let asset = self.fetch(id, include_deleted)?;
            self.policy.authorize(actor, Action::View)?;
            Ok(asset)
        })
    }

    pub fn register(&self, actor: &Actor, input: &AssetInput) -> UseCaseResult<Asset> {
        observe("asset_register", "asset", || {
            self.policy.authorize(actor, Action::Create)?;
            let asset = Asset::from_input(input, actor.user_id)?;
            self.check_references(&asset)?;
            self.check_unique(&asset)?;

            let id = self.repo.create_asset(&asset)?;
            self.fetch(id, false)
        })
    }

    pub fn edit(&self, actor: &Actor, id: AssetId, input: &AssetInput) -> UseCaseResult<Asset> {
        observe("asset_edit", "asset", || {
            let mut asset = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Edit)?;

            asset.apply(input)?;
            self.check_references(&asset)?;
            self.check_unique(&asset)?;
            asset.audit.touch(actor.user_id);

            self.repo.update_asset(&asset)?;
            self.fetch(id, false)
        })
    }

    pub fn remove(&self, actor: &Actor, id: AssetId) -> UseCaseResult<()> {
        observe("asset_remove", "asset", || {
            let mut asset = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Remove)?;
            if self.repo.has_active_loan(id)? {
                return Err(UseCaseError::InvalidState(StateViolation::InActiveLoan(
                    EntityKind::Asset,
                )));
            }

            asset.audit.soft_delete(actor.user_id);
            self.repo.update_asset(&asset)?;
            Ok(())
        })
    }

    pub fn restore(&self, actor: &Actor, id: AssetId) -> UseCaseResult<Asset> {
        observe("asset_restore", "asset", || {
            let mut asset = self.fetch(id, true)?;
            self.policy.authorize(actor, Action::Remove)?;
            if !asset.audit.is_deleted() {
                return Ok(asset);
            }

            asset.audit.restore(actor.user_id);
            self.repo.update_asset(&asset)?;
            self.fetch(id, false)
        })
    }

    fn fetch(&self, id: AssetId, include_deleted: bool) -> UseCaseResult<Asset> {
        self.repo
            .get_asset(id, include_deleted)?
            .ok_or_else(|| UseCaseError::not_found(EntityKind::Asset, id))
    }

    fn check_references(&self, asset: &Asset) -> UseCaseResult<()> {
        let references = [
            (asset.asset_type_id, CatalogKind::AssetType, "asset_type_id"),
            (asset.fragility_id, CatalogKind::Fragility, "fragility_id"),
            (asset.condition_id, CatalogKind::Condition, "condition_id"),
            (asset.brand_model_id, CatalogKind::BrandModel, "brand_model_id"),
        ];
        for (id, expected, field) in references {
            ensure_catalog_ref(self.repo.catalog_entry_kind(id)?, id, expected, field)?;
        }
        Ok(())
    }

    fn check_unique(&self, asset: &Asset) -> UseCaseResult<()> {
        match self.repo.find_asset_by_patrimonio(&asset.patrimonio)? {
            Some(existing) if existing.id != asset.id => Err(UseCaseError::Duplicate {
                entity: EntityKind::Asset,
                field: "patrimonio".to_string(),
            }),
            _ => Ok(()),
        }
    }
}
