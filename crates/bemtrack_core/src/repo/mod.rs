//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts, one per entity.
//! - Own uniqueness lookups and soft-delete filtering.
//! - Isolate SQL details from service/business orchestration.
//!
//! # Invariants
//! - Default reads exclude rows with `deleted_at` set.
//! - Repository APIs return semantic errors (`NotFound`, `Duplicate`,
//!   `ActiveLoanConflict`) in addition to DB transport errors.

pub mod asset_repo;
pub mod catalog_repo;
pub mod loan_repo;
pub mod occurrence_repo;
pub mod student_repo;
pub mod user_repo;

use crate::db::DbError;
use crate::model::audit::AuditStamp;
use crate::model::EntityKind;
use crate::repo::loan_repo::ActiveLoanConflict;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Shared audit column list, in the order `audit_values` binds them.
pub(crate) const AUDIT_COLUMNS: &str = "created_at, created_by, updated_at, updated_by, deleted_at";

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound {
        entity: EntityKind,
        id: Uuid,
    },
    /// Unique key collision on `field`.
    Duplicate {
        entity: EntityKind,
        field: String,
    },
    /// Active-loan invariant would be broken by the write.
    ActiveLoanConflict(ActiveLoanConflict),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Duplicate { entity, field } => {
                write!(f, "{entity} with this {field} already exists")
            }
            Self::ActiveLoanConflict(conflict) => write!(f, "{conflict}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing; run migrations")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Paging and tombstone visibility for list queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl ListQuery {
    pub fn including_deleted() -> Self {
        Self {
            include_deleted: true,
            ..Self::default()
        }
    }

    pub(crate) fn push_paging(&self, sql: &mut String, bind_values: &mut Vec<Value>) {
        push_paging(sql, bind_values, self.limit, self.offset);
    }
}

/// Appends `LIMIT/OFFSET` clauses and their bind values.
///
/// SQLite needs a `LIMIT` before `OFFSET`; `-1` means unbounded.
pub(crate) fn push_paging(
    sql: &mut String,
    bind_values: &mut Vec<Value>,
    limit: Option<u32>,
    offset: u32,
) {
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
        if offset > 0 {
            sql.push_str(" OFFSET ?");
            bind_values.push(Value::Integer(i64::from(offset)));
        }
    } else if offset > 0 {
        sql.push_str(" LIMIT -1 OFFSET ?");
        bind_values.push(Value::Integer(i64::from(offset)));
    }
}

/// Maps a SQLite unique-constraint failure to `RepoError::Duplicate`.
///
/// SQLite reports `UNIQUE constraint failed: table.column[, ...]`; the first
/// column name becomes the duplicate field.
pub(crate) fn map_unique_violation(err: rusqlite::Error, entity: EntityKind) -> RepoError {
    if let Some(field) = unique_violation_column(&err) {
        return RepoError::Duplicate { entity, field };
    }
    err.into()
}

pub(crate) fn unique_violation_column(err: &rusqlite::Error) -> Option<String> {
    if err.sqlite_error_code() != Some(ErrorCode::ConstraintViolation) {
        return None;
    }
    let rusqlite::Error::SqliteFailure(_, Some(message)) = err else {
        return None;
    };
    let columns = message.strip_prefix("UNIQUE constraint failed: ")?;
    let first = columns.split(',').next()?.trim();
    let column = first.rsplit('.').next().unwrap_or(first);
    Some(column.to_string())
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(value: Option<String>, column: &str) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn get_uuid(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    parse_uuid(&text, column)
}

pub(crate) fn get_optional_uuid(row: &Row<'_>, column: &str) -> RepoResult<Option<Uuid>> {
    parse_optional_uuid(row.get(column)?, column)
}

pub(crate) fn parse_audit(row: &Row<'_>) -> RepoResult<AuditStamp> {
    Ok(AuditStamp {
        created_at: row.get("created_at")?,
        created_by: get_optional_uuid(row, "created_by")?,
        updated_at: row.get("updated_at")?,
        updated_by: get_optional_uuid(row, "updated_by")?,
        deleted_at: row.get("deleted_at")?,
    })
}

/// Audit values in `AUDIT_COLUMNS` order.
pub(crate) fn audit_values(audit: &AuditStamp) -> [Value; 5] {
    [
        Value::Integer(audit.created_at),
        optional_uuid_value(audit.created_by),
        Value::Integer(audit.updated_at),
        optional_uuid_value(audit.updated_by),
        audit.deleted_at.map_or(Value::Null, Value::Integer),
    ]
}

pub(crate) fn optional_uuid_value(value: Option<Uuid>) -> Value {
    value.map_or(Value::Null, |id| Value::Text(id.to_string()))
}

pub(crate) fn optional_text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Fails with `MissingRequiredTable` unless every table exists.
pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{push_paging, unique_violation_column, ListQuery};
    use rusqlite::types::Value;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_column_extracts_first_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (a TEXT UNIQUE, b TEXT);
             INSERT INTO t (a, b) VALUES ('x', 'y');",
        )
        .unwrap();
        let err = conn
            .execute("INSERT INTO t (a, b) VALUES ('x', 'z');", [])
            .unwrap_err();
        assert_eq!(unique_violation_column(&err).as_deref(), Some("a"));

        let other = conn.execute("INSERT INTO missing VALUES (1);", []).unwrap_err();
        assert_eq!(unique_violation_column(&other), None);
    }

    #[test]
    fn paging_without_limit_uses_negative_limit_for_offset() {
        let mut sql = String::from("SELECT 1");
        let mut binds = Vec::new();
        ListQuery {
            offset: 5,
            ..ListQuery::default()
        }
        .push_paging(&mut sql, &mut binds);
        assert!(sql.ends_with("LIMIT -1 OFFSET ?"));
        assert_eq!(binds, vec![Value::Integer(5)]);
    }

    #[test]
    fn paging_binds_limit_then_offset() {
        let mut sql = String::from("SELECT 1");
        let mut binds = Vec::new();
        push_paging(&mut sql, &mut binds, Some(10), 20);
        assert!(sql.ends_with(" LIMIT ? OFFSET ?"));
        assert_eq!(binds, vec![Value::Integer(10), Value::Integer(20)]);
    }
}
