//! Core domain logic for bemtrack, the institutional asset and loan tracker.
//! This crate is the single source of truth for business invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod policy;
pub mod repo;
pub mod service;

pub use config::{BemtrackConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use rusqlite::Connection;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::loan::{Loan, LoanId, LoanInput, LoanState};
pub use model::EntityKind;
pub use policy::{Action, Actor, PermissionDenied, Policy, Resource, RolePolicy};
pub use repo::{ListQuery, RepoError, RepoResult};
pub use service::{StateViolation, UseCaseError, UseCaseResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
