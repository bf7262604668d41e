//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate policy checks, repository calls and domain invariants.
//! - Return a tagged `UseCaseError` for every expected failure.
//!
//! # Invariants
//! - Services never bypass repository persistence contracts.
//! - Services remain storage-agnostic (generic over repository traits).

pub mod asset_service;
pub mod auth_service;
pub mod catalog_service;
pub mod loan_service;
pub mod occurrence_service;
pub mod reminder_service;
pub mod student_service;
pub mod term_service;

use crate::model::catalog::{CatalogId, CatalogKind};
use crate::model::loan::{LoanReturnError, LoanTransitionError};
use crate::model::occurrence::OccurrenceError;
use crate::model::validation::ValidationError;
use crate::model::EntityKind;
use crate::policy::PermissionDenied;
use crate::repo::loan_repo::ActiveLoanConflict;
use crate::repo::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type UseCaseResult<T> = Result<T, UseCaseError>;

/// Business rule that blocked a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    AssetHasActiveLoan,
    StudentHasActiveLoan,
    LoanAlreadyReturned,
    LoanCanceled,
    /// Operation needs an active loan.
    LoanNotActive,
    /// Operation needs a finished (returned) loan.
    LoanNotReturned,
    OccurrenceAlreadyCanceled,
    /// Entity cannot be removed while it takes part in an active loan.
    InActiveLoan(EntityKind),
}

impl Display for StateViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssetHasActiveLoan => write!(f, "asset already has active loan"),
            Self::StudentHasActiveLoan => write!(f, "student already has active loan"),
            Self::LoanAlreadyReturned => write!(f, "loan already returned"),
            Self::LoanCanceled => write!(f, "loan is canceled"),
            Self::LoanNotActive => write!(f, "loan is not active"),
            Self::LoanNotReturned => write!(f, "loan has not been returned"),
            Self::OccurrenceAlreadyCanceled => write!(f, "occurrence already canceled"),
            Self::InActiveLoan(entity) => write!(f, "{entity} has an active loan"),
        }
    }
}

/// Tagged error result returned by every use-case.
#[derive(Debug)]
pub enum UseCaseError {
    PermissionDenied(PermissionDenied),
    NotFound { entity: EntityKind, id: Uuid },
    Duplicate { entity: EntityKind, field: String },
    InvalidState(StateViolation),
    Validation(ValidationError),
    /// Unexpected storage failure; keeps the source error.
    Persistence(RepoError),
}

impl UseCaseError {
    /// Stable machine-readable code, used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound { .. } => "not_found",
            Self::Duplicate { .. } => "duplicate",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation(_) => "validation",
            Self::Persistence(_) => "persistence",
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl Display for UseCaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Duplicate { entity, field } => {
                write!(f, "{entity} with this {field} already exists")
            }
            Self::InvalidState(violation) => write!(f, "{violation}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Persistence(err) => write!(f, "persistence failure: {err}"),
        }
    }
}

impl Error for UseCaseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PermissionDenied(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for UseCaseError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Duplicate { entity, field } => Self::Duplicate { entity, field },
            RepoError::ActiveLoanConflict(ActiveLoanConflict::Asset(_)) => {
                Self::InvalidState(StateViolation::AssetHasActiveLoan)
            }
            RepoError::ActiveLoanConflict(ActiveLoanConflict::Student(_)) => {
                Self::InvalidState(StateViolation::StudentHasActiveLoan)
            }
            other => Self::Persistence(other),
        }
    }
}

impl From<PermissionDenied> for UseCaseError {
    fn from(value: PermissionDenied) -> Self {
        Self::PermissionDenied(value)
    }
}

impl From<ValidationError> for UseCaseError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<LoanReturnError> for UseCaseError {
    fn from(value: LoanReturnError) -> Self {
        match value {
            LoanReturnError::Transition(LoanTransitionError::AlreadyReturned) => {
                Self::InvalidState(StateViolation::LoanAlreadyReturned)
            }
            LoanReturnError::Transition(LoanTransitionError::Canceled) => {
                Self::InvalidState(StateViolation::LoanCanceled)
            }
            LoanReturnError::Validation(err) => Self::Validation(err),
        }
    }
}

impl From<OccurrenceError> for UseCaseError {
    fn from(value: OccurrenceError) -> Self {
        match value {
            OccurrenceError::AlreadyCanceled => {
                Self::InvalidState(StateViolation::OccurrenceAlreadyCanceled)
            }
            OccurrenceError::Validation(err) => Self::Validation(err),
        }
    }
}

/// Checks that a catalog reference resolves to a live entry of `expected` kind.
pub(crate) fn ensure_catalog_ref(
    found: Option<CatalogKind>,
    id: CatalogId,
    expected: CatalogKind,
    field: &'static str,
) -> UseCaseResult<()> {
    match found {
        None => Err(UseCaseError::not_found(EntityKind::CatalogEntry, id)),
        Some(kind) if kind == expected => Ok(()),
        Some(_) => Err(ValidationError::WrongCatalogKind {
            field,
            expected: expected.as_str(),
        }
        .into()),
    }
}

/// Runs one use-case body and emits a metadata-only log line for its outcome.
pub(crate) fn observe<T>(
    event: &'static str,
    module: &'static str,
    run: impl FnOnce() -> UseCaseResult<T>,
) -> UseCaseResult<T> {
    let started_at = Instant::now();
    let result = run();
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => info!(
            "event={} module={} status=ok duration_ms={}",
            event, module, duration_ms
        ),
        Err(UseCaseError::Persistence(err)) => error!(
            "event={} module={} status=error duration_ms={} error_code=persistence error={}",
            event, module, duration_ms, err
        ),
        Err(err) => warn!(
            "event={} module={} status=rejected duration_ms={} error_code={}",
            event,
            module,
            duration_ms,
            err.code()
        ),
    }
    result
}
