//! Reference catalog use-cases (campus, course, asset type, ...).
//!
//! # Invariants
//! - `(kind, name)` is unique, case-insensitively.
//! - A course may point at a campus; no other kind takes a parent.

use crate::model::catalog::{CatalogEntry, CatalogId, CatalogKind};
use crate::model::validation::{require_text, ValidationError};
use crate::model::EntityKind;
use crate::policy::{Action, Actor, Policy, Resource, RolePolicy};
use crate::repo::catalog_repo::CatalogRepository;
use crate::repo::ListQuery;
use crate::service::{ensure_catalog_ref, observe, UseCaseError, UseCaseResult};

pub struct CatalogService<R: CatalogRepository, P: Policy = RolePolicy> {
    repo: R,
    policy: P,
}

impl<R: CatalogRepository> CatalogService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, RolePolicy::for_resource(Resource::Catalog))
    }
}

impl<R: CatalogRepository, P: Policy> CatalogService<R, P> {
    pub fn with_policy(repo: R, policy: P) -> Self {
        Self { repo, policy }
    }

    /// Registers one reference entry.
    pub fn register(
        &self,
        actor: &Actor,
        kind: CatalogKind,
        name: &str,
        parent_id: Option<CatalogId>,
    ) -> UseCaseResult<CatalogEntry> {
        observe("catalog_register", "catalog", || {
            self.policy.authorize(actor, Action::Create)?;
            let name = require_text("name", name)?;

            match (kind.parent_kind(), parent_id) {
                (None, Some(_)) => {
                    return Err(ValidationError::UnexpectedParent {
                        kind: kind.as_str(),
                    }
                    .into())
                }
                (Some(expected), Some(parent_id)) => {
                    let found = self
                        .repo
                        .get_entry(parent_id, false)?
                        .map(|parent| parent.kind);
                    ensure_catalog_ref(found, parent_id, expected, "parent_id")?;
                }
                (_, None) => {}
            }

            if self.repo.find_entry_by_name(kind, &name)?.is_some() {
                return Err(UseCaseError::Duplicate {
                    entity: EntityKind::CatalogEntry,
                    field: "name".to_string(),
                });
            }

            let entry = CatalogEntry::new(kind, name, parent_id, Some(actor.user_id));
            let id = self.repo.create_entry(&entry)?;
            self.repo
                .get_entry(id, false)?
                .ok_or_else(|| UseCaseError::not_found(EntityKind::CatalogEntry, id))
        })
    }

    /// Lists entries, optionally of one kind, ordered by kind then name.
    pub fn list(
        &self,
        actor: &Actor,
        kind: Option<CatalogKind>,
        query: &ListQuery,
    ) -> UseCaseResult<Vec<CatalogEntry>> {
        observe("catalog_list", "catalog", || {
            self.policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_entries(kind, query)?)
        })
    }

    pub fn get(
        &self,
        actor: &Actor,
        id: CatalogId,
        include_deleted: bool,
    ) -> UseCaseResult<CatalogEntry> {
        observe("catalog_get", "catalog", || {
            let entry = self
                .repo
                .get_entry(id, include_deleted)?
                .ok_or_else(|| UseCaseError::not_found(EntityKind::CatalogEntry, id))?;
            self.policy.authorize(actor, Action::View)?;
            Ok(entry)
        })
    }
}
