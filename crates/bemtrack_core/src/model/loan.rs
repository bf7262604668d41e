//! Loan (emprestimo) record and its state machine.
//!
//! # Invariants
//! - `expected_return_date >= loan_date`.
//! - `actual_return_date`, when set, is `>= loan_date`.
//! - Transitions: `Active -> Finished` (return) and `Active -> Canceled`
//!   (removal). `Finished` and `Canceled` are terminal.
//! - At most one active loan per asset and per student; enforced by the
//!   loan repository, not by this type.

use crate::model::asset::AssetId;
use crate::model::audit::AuditStamp;
use crate::model::student::StudentId;
use crate::model::user::UserId;
use crate::model::validation::{optional_text, storable_date, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type LoanId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanState {
    Active,
    Finished,
    Canceled,
}

impl LoanState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finished => "finished",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "active" => Some(Self::Active),
            "finished" => Some(Self::Finished),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Rejected loan state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanTransitionError {
    /// Loan is finished, or already carries a return date/acknowledger.
    AlreadyReturned,
    Canceled,
}

impl Display for LoanTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyReturned => write!(f, "loan already returned"),
            Self::Canceled => write!(f, "loan is canceled"),
        }
    }
}

impl Error for LoanTransitionError {}

/// Fields a clerk supplies when opening a loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanInput {
    pub student_id: StudentId,
    pub asset_id: AssetId,
    pub loan_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub student_id: StudentId,
    pub asset_id: AssetId,
    pub loan_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    /// User who acknowledged the return.
    pub returned_to: Option<UserId>,
    pub state: LoanState,
    pub notes: Option<String>,
    pub audit: AuditStamp,
}

impl Loan {
    /// Opens an active loan.
    pub fn from_input(input: &LoanInput, actor: UserId) -> Result<Self, ValidationError> {
        let loan = Self {
            id: Uuid::new_v4(),
            student_id: input.student_id,
            asset_id: input.asset_id,
            loan_date: input.loan_date,
            expected_return_date: input.expected_return_date,
            actual_return_date: None,
            returned_to: None,
            state: LoanState::Active,
            notes: optional_text(input.notes.as_deref()),
            audit: AuditStamp::new(Some(actor)),
        };
        loan.validate()?;
        Ok(loan)
    }

    /// Checks date range and ordering invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        storable_date("loan_date", self.loan_date)?;
        storable_date("expected_return_date", self.expected_return_date)?;
        if self.expected_return_date < self.loan_date {
            return Err(ValidationError::DateOrder {
                field: "expected_return_date",
                reference: "loan_date",
            });
        }
        if let Some(returned_on) = self.actual_return_date {
            storable_date("actual_return_date", returned_on)?;
            if returned_on < self.loan_date {
                return Err(ValidationError::DateOrder {
                    field: "actual_return_date",
                    reference: "loan_date",
                });
            }
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state == LoanState::Active && !self.audit.is_deleted()
    }

    /// Whether the loan is still out past its due date on `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.expected_return_date < today
    }

    /// Guards and applies `Active -> Finished`.
    pub fn register_return(
        &mut self,
        returned_on: NaiveDate,
        acknowledged_by: UserId,
    ) -> Result<(), LoanReturnError> {
        match self.state {
            LoanState::Finished => return Err(LoanTransitionError::AlreadyReturned.into()),
            LoanState::Canceled => return Err(LoanTransitionError::Canceled.into()),
            LoanState::Active => {}
        }
        if self.actual_return_date.is_some() || self.returned_to.is_some() {
            return Err(LoanTransitionError::AlreadyReturned.into());
        }
        storable_date("actual_return_date", returned_on).map_err(LoanReturnError::Validation)?;
        if returned_on < self.loan_date {
            return Err(LoanReturnError::Validation(ValidationError::DateOrder {
                field: "actual_return_date",
                reference: "loan_date",
            }));
        }

        self.actual_return_date = Some(returned_on);
        self.returned_to = Some(acknowledged_by);
        self.state = LoanState::Finished;
        self.audit.touch(acknowledged_by);
        Ok(())
    }

    /// Soft-deletes the loan; an active loan becomes canceled on the way.
    pub fn remove(&mut self, actor: UserId) {
        if self.state == LoanState::Active {
            self.state = LoanState::Canceled;
        }
        self.audit.soft_delete(actor);
    }
}

/// Failure of [`Loan::register_return`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanReturnError {
    Transition(LoanTransitionError),
    Validation(ValidationError),
}

impl From<LoanTransitionError> for LoanReturnError {
    fn from(value: LoanTransitionError) -> Self {
        Self::Transition(value)
    }
}

impl Display for LoanReturnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transition(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LoanReturnError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transition(err) => Some(err),
            Self::Validation(err) => Some(err),
        }
    }
}
