//! Student use-cases.
//!
//! # Responsibility
//! - Register, edit, remove, restore and query students.
//! - Enforce `cpf` / `email` / `matricula` uniqueness with a field-named
//!   `Duplicate` error before the storage constraint would fire.
//!
//! # Invariants
//! - Uniqueness lookups include soft-deleted rows; a removed student is
//!   restored, not registered again.
//! - A student with an active loan cannot be removed.

use crate::model::catalog::CatalogKind;
use crate::model::student::{Student, StudentId, StudentInput};
use crate::model::EntityKind;
use crate::policy::{Action, Actor, Policy, Resource, RolePolicy};
use crate::repo::student_repo::{StudentKey, StudentRepository};
use crate::repo::ListQuery;
use crate::service::{ensure_catalog_ref, observe, StateViolation, UseCaseError, UseCaseResult};

pub struct StudentService<R: StudentRepository, P: Policy = RolePolicy> {
    repo: R,
    policy: P,
}

impl<R: StudentRepository> StudentService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, RolePolicy::for_resource(Resource::Student))
    }
}

impl<R: StudentRepository, P: Policy> StudentService<R, P> {
    pub fn with_policy(repo: R, policy: P) -> Self {
        Self { repo, policy }
    }

    pub fn list(&self, actor: &Actor, query: &ListQuery) -> UseCaseResult<Vec<Student>> {
        observe("student_list", "student", || {
            self.policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_students(query)?)
        })
    }

    pub fn get(
        &self,
        actor: &Actor,
        id: StudentId,
        include_deleted: bool,
    ) -> UseCaseResult<Student> {
        observe("student_get", "student", || {
            let student = self.fetch(id, include_deleted)?;
            self.policy.authorize(actor, Action::View)?;
            Ok(student)
        })
    }

    pub fn register(&self, actor: &Actor, input: &StudentInput) -> UseCaseResult<Student> {
        observe("student_register", "student", || {
            self.policy.authorize(actor, Action::Create)?;
            let student = Student::from_input(input, actor.user_id)?;
            self.check_references(&student)?;
            self.check_unique(&student)?;

            let id = self.repo.create_student(&student)?;
            self.fetch(id, false)
        })
    }

    /// Replaces all editable fields of a live student.
    pub fn edit(
        &self,
        actor: &Actor,
        id: StudentId,
        input: &StudentInput,
    ) -> UseCaseResult<Student> {
        observe("student_edit", "student", || {
            let mut student = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Edit)?;

            student.apply(input)?;
            self.check_references(&student)?;
            self.check_unique(&student)?;
            student.audit.touch(actor.user_id);

            self.repo.update_student(&student)?;
            self.fetch(id, false)
        })
    }

    pub fn remove(&self, actor: &Actor, id: StudentId) -> UseCaseResult<()> {
        observe("student_remove", "student", || {
            let mut student = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Remove)?;
            if self.repo.has_active_loan(id)? {
                return Err(UseCaseError::InvalidState(StateViolation::InActiveLoan(
                    EntityKind::Student,
                )));
            }

            student.audit.soft_delete(actor.user_id);
            self.repo.update_student(&student)?;
            Ok(())
        })
    }

    /// Clears the tombstone. Restoring a live student is a no-op.
    pub fn restore(&self, actor: &Actor, id: StudentId) -> UseCaseResult<Student> {
        observe("student_restore", "student", || {
            let mut student = self.fetch(id, true)?;
            self.policy.authorize(actor, Action::Remove)?;
            if !student.audit.is_deleted() {
                return Ok(student);
            }

            student.audit.restore(actor.user_id);
            self.repo.update_student(&student)?;
            self.fetch(id, false)
        })
    }

    fn fetch(&self, id: StudentId, include_deleted: bool) -> UseCaseResult<Student> {
        self.repo
            .get_student(id, include_deleted)?
            .ok_or_else(|| UseCaseError::not_found(EntityKind::Student, id))
    }

    fn check_references(&self, student: &Student) -> UseCaseResult<()> {
        ensure_catalog_ref(
            self.repo.catalog_entry_kind(student.course_id)?,
            student.course_id,
            CatalogKind::Course,
            "course_id",
        )?;
        ensure_catalog_ref(
            self.repo.catalog_entry_kind(student.admission_method_id)?,
            student.admission_method_id,
            CatalogKind::AdmissionMethod,
            "admission_method_id",
        )
    }

    fn check_unique(&self, student: &Student) -> UseCaseResult<()> {
        let keys = [
            StudentKey::Cpf(&student.cpf),
            StudentKey::Email(&student.email),
            StudentKey::Matricula(&student.matricula),
        ];
        for key in keys {
            if let Some(existing) = self.repo.find_student_by(key)? {
                if existing.id != student.id {
                    return Err(UseCaseError::Duplicate {
                        entity: EntityKind::Student,
                        field: key.field().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
