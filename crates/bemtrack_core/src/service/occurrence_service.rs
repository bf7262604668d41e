//! Occurrence (incident) use-cases and occurrence type maintenance.
//!
//! # Invariants
//! - Occurrences attach to a live loan and a live occurrence type.
//! - A canceled occurrence is frozen.
//! - Occurrence type names are unique, case-insensitively, across live and
//!   removed types.

use crate::model::occurrence::{
    Occurrence, OccurrenceId, OccurrenceInput, OccurrenceType, OccurrenceTypeId,
};
use crate::model::validation::{optional_text, require_text};
use crate::model::EntityKind;
use crate::policy::{Action, Actor, Policy, Resource, RolePolicy};
use crate::repo::occurrence_repo::{OccurrenceListQuery, OccurrenceRepository};
use crate::repo::ListQuery;
use crate::service::{observe, UseCaseError, UseCaseResult};
use chrono::NaiveDate;

/// Editable fields of an occurrence. The loan link is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceEdit {
    pub occurrence_type_id: OccurrenceTypeId,
    pub occurrence_date: NaiveDate,
    pub description: String,
}

/// Occurrence service; `policy` guards occurrences, `type_policy` guards
/// occurrence types.
pub struct OccurrenceService<R: OccurrenceRepository, P: Policy = RolePolicy> {
    repo: R,
    policy: P,
    type_policy: P,
}

impl<R: OccurrenceRepository> OccurrenceService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(
            repo,
            RolePolicy::for_resource(Resource::Occurrence),
            RolePolicy::for_resource(Resource::OccurrenceType),
        )
    }
}

impl<R: OccurrenceRepository, P: Policy> OccurrenceService<R, P> {
    pub fn with_policy(repo: R, policy: P, type_policy: P) -> Self {
        Self {
            repo,
            policy,
            type_policy,
        }
    }

    /// Lists occurrences, newest first, optionally for one loan.
    pub fn list(
        &self,
        actor: &Actor,
        query: &OccurrenceListQuery,
    ) -> UseCaseResult<Vec<Occurrence>> {
        observe("occurrence_list", "occurrence", || {
            self.policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_occurrences(query)?)
        })
    }

    pub fn get(
        &self,
        actor: &Actor,
        id: OccurrenceId,
        include_deleted: bool,
    ) -> UseCaseResult<Occurrence> {
        observe("occurrence_get", "occurrence", || {
            let occurrence = self.fetch(id, include_deleted)?;
            self.policy.authorize(actor, Action::View)?;
            Ok(occurrence)
        })
    }

    pub fn register(&self, actor: &Actor, input: &OccurrenceInput) -> UseCaseResult<Occurrence> {
        observe("occurrence_register", "occurrence", || {
            self.policy.authorize(actor, Action::Create)?;
            let occurrence = Occurrence::from_input(input, actor.user_id)?;
            if !self.repo.loan_exists(occurrence.loan_id)? {
                return Err(UseCaseError::not_found(EntityKind::Loan, occurrence.loan_id));
            }
            self.fetch_type(occurrence.occurrence_type_id, false)?;

            let id = self.repo.create_occurrence(&occurrence)?;
            self.fetch(id, false)
        })
    }

    pub fn edit(
        &self,
        actor: &Actor,
        id: OccurrenceId,
        edit: &OccurrenceEdit,
    ) -> UseCaseResult<Occurrence> {
        observe("occurrence_edit", "occurrence", || {
            let mut occurrence = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Edit)?;
            occurrence.edit(
                edit.occurrence_type_id,
                edit.occurrence_date,
                &edit.description,
                actor.user_id,
            )?;
            self.fetch_type(edit.occurrence_type_id, false)?;

            self.repo.update_occurrence(&occurrence)?;
            self.fetch(id, false)
        })
    }

    /// Cancels an occurrence with a mandatory reason.
    ///
    /// Check order: `NotFound`, then `PermissionDenied`, then already canceled.
    pub fn cancel(
        &self,
        actor: &Actor,
        id: OccurrenceId,
        reason: &str,
    ) -> UseCaseResult<Occurrence> {
        observe("occurrence_cancel", "occurrence", || {
            let mut occurrence = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Remove)?;
            occurrence.cancel(reason, actor.user_id)?;

            self.repo.update_occurrence(&occurrence)?;
            self.fetch(id, false)
        })
    }

    pub fn register_type(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<&str>,
    ) -> UseCaseResult<OccurrenceType> {
        observe("occurrence_type_register", "occurrence", || {
            self.type_policy.authorize(actor, Action::Create)?;
            let kind = OccurrenceType::new(name, description, actor.user_id)?;
            self.check_type_name(&kind)?;

            let id = self.repo.create_occurrence_type(&kind)?;
            self.fetch_type(id, false)
        })
    }

    pub fn list_types(
        &self,
        actor: &Actor,
        query: &ListQuery,
    ) -> UseCaseResult<Vec<OccurrenceType>> {
        observe("occurrence_type_list", "occurrence", || {
            self.type_policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_occurrence_types(query)?)
        })
    }

    pub fn edit_type(
        &self,
        actor: &Actor,
        id: OccurrenceTypeId,
        name: &str,
        description: Option<&str>,
    ) -> UseCaseResult<OccurrenceType> {
        observe("occurrence_type_edit", "occurrence", || {
            let mut kind = self.fetch_type(id, false)?;
            self.type_policy.authorize(actor, Action::Edit)?;

            kind.name = require_text("name", name)?;
            kind.description = optional_text(description);
            self.check_type_name(&kind)?;
            kind.audit.touch(actor.user_id);

            self.repo.update_occurrence_type(&kind)?;
            self.fetch_type(id, false)
        })
    }

    pub fn remove_type(&self, actor: &Actor, id: OccurrenceTypeId) -> UseCaseResult<()> {
        observe("occurrence_type_remove", "occurrence", || {
            let mut kind = self.fetch_type(id, false)?;
            self.type_policy.authorize(actor, Action::Remove)?;
            kind.audit.soft_delete(actor.user_id);
            self.repo.update_occurrence_type(&kind)?;
            Ok(())
        })
    }

    pub fn restore_type(
        &self,
        actor: &Actor,
        id: OccurrenceTypeId,
    ) -> UseCaseResult<OccurrenceType> {
        observe("occurrence_type_restore", "occurrence", || {
            let mut kind = self.fetch_type(id, true)?;
            self.type_policy.authorize(actor, Action::Remove)?;
            if !kind.audit.is_deleted() {
                return Ok(kind);
            }

            kind.audit.restore(actor.user_id);
            self.repo.update_occurrence_type(&kind)?;
            self.fetch_type(id, false)
        })
    }

    fn fetch(&self, id: OccurrenceId, include_deleted: bool) -> UseCaseResult<Occurrence> {
        self.repo
            .get_occurrence(id, include_deleted)?
            .ok_or_else(|| UseCaseError::not_found(EntityKind::Occurrence, id))
    }

    fn fetch_type(
        &self,
        id: OccurrenceTypeId,
        include_deleted: bool,
    ) -> UseCaseResult<OccurrenceType> {
        self.repo
            .get_occurrence_type(id, include_deleted)?
            .ok_or_else(|| UseCaseError::not_found(EntityKind::OccurrenceType, id))
    }

    fn check_type_name(&self, kind: &OccurrenceType) -> UseCaseResult<()> {
        match self.repo.find_occurrence_type_by_name(&kind.name)? {
            Some(existing) if existing.id != kind.id => Err(UseCaseError::Duplicate {
                entity: EntityKind::OccurrenceType,
                field: "name".to_string(),
            }),
            _ => Ok(()),
        }
    }
}
