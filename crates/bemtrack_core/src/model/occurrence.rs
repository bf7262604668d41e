//! Occurrence (ocorrencia) records attached to loans, and their types.
//!
//! # Invariants
//! - A canceled occurrence is frozen: no second cancel, no edit.
//! - `cancellation_reason` is non-blank whenever `canceled_at` is set.

use crate::model::audit::{now_epoch_ms, AuditStamp};
use crate::model::loan::LoanId;
use crate::model::user::UserId;
use crate::model::validation::{optional_text, require_text, storable_date, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type OccurrenceId = Uuid;
pub type OccurrenceTypeId = Uuid;

/// Incident category such as damage or loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceType {
    pub id: OccurrenceTypeId,
    pub name: String,
    pub description: Option<String>,
    pub audit: AuditStamp,
}

impl OccurrenceType {
    pub fn new(
        name: &str,
        description: Option<&str>,
        actor: UserId,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name: require_text("name", name)?,
            description: optional_text(description),
            audit: AuditStamp::new(Some(actor)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceInput {
    pub loan_id: LoanId,
    pub occurrence_type_id: OccurrenceTypeId,
    pub occurrence_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub loan_id: LoanId,
    pub occurrence_type_id: OccurrenceTypeId,
    pub occurrence_date: NaiveDate,
    pub description: String,
    pub canceled_at: Option<i64>,
    pub canceled_by: Option<UserId>,
    pub cancellation_reason: Option<String>,
    pub audit: AuditStamp,
}

/// Rejected occurrence mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccurrenceError {
    AlreadyCanceled,
    Validation(ValidationError),
}

impl Display for OccurrenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyCanceled => write!(f, "occurrence already canceled"),
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OccurrenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::AlreadyCanceled => None,
        }
    }
}

impl From<ValidationError> for OccurrenceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl Occurrence {
    pub fn from_input(input: &OccurrenceInput, actor: UserId) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            loan_id: input.loan_id,
            occurrence_type_id: input.occurrence_type_id,
            occurrence_date: storable_date("occurrence_date", input.occurrence_date)?,
            description: require_text("description", &input.description)?,
            canceled_at: None,
            canceled_by: None,
            cancellation_reason: None,
            audit: AuditStamp::new(Some(actor)),
        })
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }

    /// Replaces type, date and description. The loan link is fixed.
    pub fn edit(
        &mut self,
        occurrence_type_id: OccurrenceTypeId,
        occurrence_date: NaiveDate,
        description: &str,
        actor: UserId,
    ) -> Result<(), OccurrenceError> {
        if self.is_canceled() {
            return Err(OccurrenceError::AlreadyCanceled);
        }
        let occurrence_date = storable_date("occurrence_date", occurrence_date)?;
        self.description = require_text("description", description)?;
        self.occurrence_type_id = occurrence_type_id;
        self.occurrence_date = occurrence_date;
        self.audit.touch(actor);
        Ok(())
    }

    /// Stamps cancellation fields.
    pub fn cancel(&mut self, reason: &str, actor: UserId) -> Result<(), OccurrenceError> {
        if self.is_canceled() {
            return Err(OccurrenceError::AlreadyCanceled);
        }
        let reason = require_text("cancellation_reason", reason)?;
        self.canceled_at = Some(now_epoch_ms());
        self.canceled_by = Some(actor);
        self.cancellation_reason = Some(reason);
        self.audit.touch(actor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Occurrence, OccurrenceError, OccurrenceInput};
    use crate::model::validation::ValidationError;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn occurrence() -> Occurrence {
        let input = OccurrenceInput {
            loan_id: Uuid::new_v4(),
            occurrence_type_id: Uuid::new_v4(),
            occurrence_date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            description: "screen cracked".to_string(),
        };
        Occurrence::from_input(&input, Uuid::new_v4()).unwrap()
    }

    #[test]
    fn cancel_twice_fails_with_already_canceled() {
        let mut occ = occurrence();
        let actor = Uuid::new_v4();
        occ.cancel("registered by mistake", actor).unwrap();
        assert_eq!(occ.canceled_by, Some(actor));
        assert_eq!(
            occ.cancel("again", actor),
            Err(OccurrenceError::AlreadyCanceled)
        );
    }

    #[test]
    fn cancel_requires_reason() {
        let mut occ = occurrence();
        assert_eq!(
            occ.cancel("  ", Uuid::new_v4()),
            Err(OccurrenceError::Validation(ValidationError::Blank {
                field: "cancellation_reason"
            }))
        );
        assert!(!occ.is_canceled());
    }

    #[test]
    fn canceled_occurrence_cannot_be_edited() {
        let mut occ = occurrence();
        let actor = Uuid::new_v4();
        occ.cancel("duplicate", actor).unwrap();
        let err = occ
            .edit(occ.occurrence_type_id, occ.occurrence_date, "new text", actor)
            .unwrap_err();
        assert_eq!(err, OccurrenceError::AlreadyCanceled);
    }

    #[test]
    fn occurrence_dates_need_four_digit_years() {
        let mut occ = occurrence();
        let far = NaiveDate::from_ymd_opt(10000, 1, 1).unwrap();
        let err = occ
            .edit(occ.occurrence_type_id, far, "new text", Uuid::new_v4())
            .unwrap_err();
        assert_eq!(
            err,
            OccurrenceError::Validation(ValidationError::DateOutOfRange {
                field: "occurrence_date"
            })
        );
        assert_eq!(occ.description, "screen cracked");
    }
}
