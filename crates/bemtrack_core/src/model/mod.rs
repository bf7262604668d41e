//! Domain model for the asset/loan tracking core.
//!
//! # Responsibility
//! - Define canonical records for students, assets, loans and occurrences.
//! - Own the loan and occurrence state-transition guards.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Deletion is represented by a `deleted_at` tombstone, never a hard delete.

pub mod asset;
pub mod audit;
pub mod catalog;
pub mod loan;
pub mod occurrence;
pub mod student;
pub mod user;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Persisted entity families, used to tag not-found and duplicate errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CatalogEntry,
    Student,
    Asset,
    Loan,
    OccurrenceType,
    Occurrence,
    User,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CatalogEntry => "catalog entry",
            Self::Student => "student",
            Self::Asset => "asset",
            Self::Loan => "loan",
            Self::OccurrenceType => "occurrence type",
            Self::Occurrence => "occurrence",
            Self::User => "user",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
