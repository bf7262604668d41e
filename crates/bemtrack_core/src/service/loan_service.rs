//! Loan (emprestimo) use-cases.
//!
//! # Responsibility
//! - Open, return, edit, remove and restore loans.
//! - Answer overdue / due-soon queries over active loans.
//!
//! # Invariants
//! - At most one active loan per asset and per student. The repository
//!   checks and writes inside one immediate transaction, backed by partial
//!   unique indexes.
//! - Only active loans are editable.
//! - `Finished` and `Canceled` are terminal.

use crate::model::asset::AssetId;
use crate::model::loan::{Loan, LoanId, LoanInput, LoanState};
use crate::model::student::StudentId;
use crate::model::validation::optional_text;
use crate::model::EntityKind;
use crate::policy::{Action, Actor, Policy, Resource, RolePolicy};
use crate::repo::loan_repo::{DueWindow, LoanListQuery, LoanRepository};
use crate::service::{observe, StateViolation, UseCaseError, UseCaseResult};
use chrono::{Days, NaiveDate};

/// Editable fields of an active loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanEdit {
    pub student_id: StudentId,
    pub asset_id: AssetId,
    pub expected_return_date: NaiveDate,
    pub notes: Option<String>,
}

impl From<&Loan> for LoanEdit {
    fn from(loan: &Loan) -> Self {
        Self {
            student_id: loan.student_id,
            asset_id: loan.asset_id,
            expected_return_date: loan.expected_return_date,
            notes: loan.notes.clone(),
        }
    }
}

/// Expected return date for a loan opened on `loan_date` with the default
/// duration.
pub fn default_due_date(loan_date: NaiveDate, duration_days: u32) -> NaiveDate {
    loan_date
        .checked_add_days(Days::new(u64::from(duration_days)))
        .unwrap_or(NaiveDate::MAX)
}

pub struct LoanService<R: LoanRepository, P: Policy = RolePolicy> {
    repo: R,
    policy: P,
}

impl<R: LoanRepository> LoanService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, RolePolicy::for_resource(Resource::Loan))
    }
}

impl<R: LoanRepository, P: Policy> LoanService<R, P> {
    pub fn with_policy(repo: R, policy: P) -> Self {
        Self { repo, policy }
    }

    /// Lists loans by `loan_date DESC, created_at DESC`.
    pub fn list(&self, actor: &Actor, query: &LoanListQuery) -> UseCaseResult<Vec<Loan>> {
        observe("loan_list", "loan", || {
            self.policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_loans(query)?)
        })
    }

    pub fn get(&self, actor: &Actor, id: LoanId, include_deleted: bool) -> UseCaseResult<Loan> {
        observe("loan_get", "loan", || {
            let loan = self.fetch(id, include_deleted)?;
            self.policy.authorize(actor, Action::View)?;
            Ok(loan)
        })
    }

    /// Opens an active loan.
    ///
    /// Fails with `NotFound` for a missing student or asset and with
    /// `InvalidState` when either already has an active loan.
    pub fn create(&self, actor: &Actor, input: &LoanInput) -> UseCaseResult<Loan> {
        observe("loan_create", "loan", || {
            self.policy.authorize(actor, Action::Create)?;
            let loan = Loan::from_input(input, actor.user_id)?;
            let id = self.repo.create_loan(&loan)?;
            self.fetch(id, false)
        })
    }

    /// Records the return of an active loan; the actor acknowledges it.
    pub fn register_return(
        &self,
        actor: &Actor,
        id: LoanId,
        returned_on: NaiveDate,
    ) -> UseCaseResult<Loan> {
        observe("loan_return", "loan", || {
            let mut loan = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Edit)?;
            loan.register_return(returned_on, actor.user_id)?;
            self.repo.update_loan(&loan)?;
            self.fetch(id, false)
        })
    }

    pub fn edit(&self, actor: &Actor, id: LoanId, edit: &LoanEdit) -> UseCaseResult<Loan> {
        observe("loan_edit", "loan", || {
            let mut loan = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Edit)?;
            ensure_active(&loan)?;

            loan.student_id = edit.student_id;
            loan.asset_id = edit.asset_id;
            loan.expected_return_date = edit.expected_return_date;
            loan.notes = optional_text(edit.notes.as_deref());
            loan.validate()?;
            loan.audit.touch(actor.user_id);

            self.repo.update_loan(&loan)?;
            self.fetch(id, false)
        })
    }

    /// Soft-deletes a loan. An active loan is canceled on the way.
    pub fn remove(&self, actor: &Actor, id: LoanId) -> UseCaseResult<()> {
        observe("loan_remove", "loan", || {
            let mut loan = self.fetch(id, false)?;
            self.policy.authorize(actor, Action::Remove)?;
            loan.remove(actor.user_id);
            self.repo.update_loan(&loan)?;
            Ok(())
        })
    }

    /// Clears the tombstone. The state stays what removal left.
    pub fn restore(&self, actor: &Actor, id: LoanId) -> UseCaseResult<Loan> {
        observe("loan_restore", "loan", || {
            let mut loan = self.fetch(id, true)?;
            self.policy.authorize(actor, Action::Remove)?;
            if !loan.audit.is_deleted() {
                return Ok(loan);
            }

            loan.audit.restore(actor.user_id);
            self.repo.update_loan(&loan)?;
            self.fetch(id, false)
        })
    }

    /// Active loans whose expected return date is before `today`.
    pub fn list_overdue(&self, actor: &Actor, today: NaiveDate) -> UseCaseResult<Vec<Loan>> {
        observe("loan_list_overdue", "loan", || {
            self.policy.authorize(actor, Action::List)?;
            let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
                return Ok(Vec::new());
            };
            Ok(self.repo.list_active_loans_due(&DueWindow {
                from: None,
                until: yesterday,
            })?)
        })
    }

    /// Active loans due between `today` and `today + window_days`, inclusive.
    pub fn list_due_soon(
        &self,
        actor: &Actor,
        today: NaiveDate,
        window_days: u32,
    ) -> UseCaseResult<Vec<Loan>> {
        observe("loan_list_due_soon", "loan", || {
            self.policy.authorize(actor, Action::List)?;
            Ok(self.repo.list_active_loans_due(&due_window(today, window_days))?)
        })
    }

    fn fetch(&self, id: LoanId, include_deleted: bool) -> UseCaseResult<Loan> {
        self.repo
            .get_loan(id, include_deleted)?
            .ok_or_else(|| UseCaseError::not_found(EntityKind::Loan, id))
    }
}

pub(crate) fn due_window(today: NaiveDate, window_days: u32) -> DueWindow {
    DueWindow {
        from: Some(today),
        until: default_due_date(today, window_days),
    }
}

fn ensure_active(loan: &Loan) -> UseCaseResult<()> {
    match loan.state {
        LoanState::Active => Ok(()),
        LoanState::Finished | LoanState::Canceled => {
            Err(UseCaseError::InvalidState(StateViolation::LoanNotActive))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{default_due_date, due_window};
    use chrono::NaiveDate;

    #[test]
    fn default_due_date_adds_whole_days() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        assert_eq!(
            default_due_date(start, 7),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(default_due_date(NaiveDate::MAX, 1), NaiveDate::MAX);
    }

    #[test]
    fn due_window_is_inclusive_from_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let window = due_window(today, 2);
        assert_eq!(window.from, Some(today));
        assert_eq!(window.until, NaiveDate::from_ymd_opt(2024, 5, 12).unwrap());
    }
}
