//! Occurrence and occurrence-type repository.
//!
//! # Invariants
//! - Occurrence type names are unique, case-insensitively.
//! - Occurrences list newest first: `occurrence_date DESC, created_at DESC`.
//! - An occurrence can only be attached to a live loan of a live type.

use crate::model::loan::LoanId;
use crate::model::occurrence::{Occurrence, OccurrenceId, OccurrenceType, OccurrenceTypeId};
use crate::model::EntityKind;
use crate::repo::loan_repo::parse_date;
use crate::repo::{
    audit_values, ensure_tables, get_optional_uuid, get_uuid, map_unique_violation,
    optional_text_value, optional_uuid_value, parse_audit, ListQuery, RepoError, RepoResult,
    AUDIT_COLUMNS,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const OCCURRENCE_SELECT_SQL: &str = "SELECT
    uuid,
    loan_uuid,
    occurrence_type_uuid,
    occurrence_date,
    description,
    canceled_at,
    canceled_by,
    cancellation_reason,
    created_at,
    created_by,
    updated_at,
    updated_by,
    deleted_at
FROM occurrences";

const OCCURRENCE_TYPE_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    description,
    created_at,
    created_by,
    updated_at,
    updated_by,
    deleted_at
FROM occurrence_types";

/// Filter options for occurrence listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceListQuery {
    pub loan_id: Option<LoanId>,
    /// Skip canceled occurrences; they are listed by default.
    pub hide_canceled: bool,
    pub include_deleted: bool,
}

pub trait OccurrenceRepository {
    fn create_occurrence(&self, occurrence: &Occurrence) -> RepoResult<OccurrenceId>;
    /// Writes every mutable column, including cancellation stamps.
    fn update_occurrence(&self, occurrence: &Occurrence) -> RepoResult<()>;
    fn get_occurrence(
        &self,
        id: OccurrenceId,
        include_deleted: bool,
    ) -> RepoResult<Option<Occurrence>>;
    fn list_occurrences(&self, query: &OccurrenceListQuery) -> RepoResult<Vec<Occurrence>>;

    fn create_occurrence_type(&self, kind: &OccurrenceType) -> RepoResult<OccurrenceTypeId>;
    fn update_occurrence_type(&self, kind: &OccurrenceType) -> RepoResult<()>;
    fn get_occurrence_type(
        &self,
        id: OccurrenceTypeId,
        include_deleted: bool,
    ) -> RepoResult<Option<OccurrenceType>>;
    /// Case-insensitive lookup over live and deleted rows.
    fn find_occurrence_type_by_name(&self, name: &str) -> RepoResult<Option<OccurrenceType>>;
    fn list_occurrence_types(&self, query: &ListQuery) -> RepoResult<Vec<OccurrenceType>>;
    fn loan_exists(&self, loan_id: LoanId) -> RepoResult<bool>;
}

pub struct SqliteOccurrenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOccurrenceRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["occurrences", "occurrence_types", "loans"])?;
        Ok(Self { conn })
    }
}

impl OccurrenceRepository for SqliteOccurrenceRepository<'_> {
    fn create_occurrence(&self, occurrence: &Occurrence) -> RepoResult<OccurrenceId> {
        let mut values = occurrence_values(occurrence);
        values.extend(audit_values(&occurrence.audit));

        self.conn.execute(
            &format!(
                "INSERT INTO occurrences (
                    uuid,
                    loan_uuid,
                    occurrence_type_uuid,
                    occurrence_date,
                    description,
                    canceled_at,
                    canceled_by,
                    cancellation_reason,
                    {AUDIT_COLUMNS}
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);"
            ),
            params_from_iter(values),
        )?;
        Ok(occurrence.id)
    }

    fn update_occurrence(&self, occurrence: &Occurrence) -> RepoResult<()> {
        let mut values = occurrence_values(occurrence);
        values.extend(audit_values(&occurrence.audit));

        let changed = self.conn.execute(
            "UPDATE occurrences
             SET
                occurrence_type_uuid = ?3,
                occurrence_date = ?4,
                description = ?5,
                canceled_at = ?6,
                canceled_by = ?7,
                cancellation_reason = ?8,
                updated_at = ?11,
                updated_by = ?12,
                deleted_at = ?13
             WHERE uuid = ?1
               AND loan_uuid = ?2;",
            params_from_iter(values),
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Occurrence,
                id: occurrence.id,
            });
        }
        Ok(())
    }

    fn get_occurrence(
        &self,
        id: OccurrenceId,
        include_deleted: bool,
    ) -> RepoResult<Option<Occurrence>> {
        self.conn
            .query_row(
                &format!(
                    "{OCCURRENCE_SELECT_SQL}
                     WHERE uuid = ?1
                       AND (?2 = 1 OR deleted_at IS NULL);"
                ),
                params![id.to_string(), include_deleted],
                |row| Ok(parse_occurrence_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_occurrences(&self, query: &OccurrenceListQuery) -> RepoResult<Vec<Occurrence>> {
        let mut sql = format!("{OCCURRENCE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if query.hide_canceled {
            sql.push_str(" AND canceled_at IS NULL");
        }
        if let Some(loan_id) = query.loan_id {
            sql.push_str(" AND loan_uuid = ?");
            bind_values.push(Value::Text(loan_id.to_string()));
        }
        sql.push_str(" ORDER BY occurrence_date DESC, created_at DESC, uuid ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut occurrences = Vec::new();
        while let Some(row) = rows.next()? {
            occurrences.push(parse_occurrence_row(row)?);
        }
        Ok(occurrences)
    }

    fn create_occurrence_type(&self, kind: &OccurrenceType) -> RepoResult<OccurrenceTypeId> {
        let mut values = vec![
            Value::Text(kind.id.to_string()),
            Value::Text(kind.name.clone()),
            optional_text_value(kind.description.as_deref()),
        ];
        values.extend(audit_values(&kind.audit));

        self.conn
            .execute(
                &format!(
                    "INSERT INTO occurrence_types (uuid, name, description, {AUDIT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);"
                ),
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::OccurrenceType))?;
        Ok(kind.id)
    }

    fn update_occurrence_type(&self, kind: &OccurrenceType) -> RepoResult<()> {
        let mut values = vec![
            Value::Text(kind.id.to_string()),
            Value::Text(kind.name.clone()),
            optional_text_value(kind.description.as_deref()),
        ];
        values.extend(audit_values(&kind.audit));

        let changed = self
            .conn
            .execute(
                "UPDATE occurrence_types
                 SET
                    name = ?2,
                    description = ?3,
                    updated_at = ?6,
                    updated_by = ?7,
                    deleted_at = ?8
                 WHERE uuid = ?1;",
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::OccurrenceType))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::OccurrenceType,
                id: kind.id,
            });
        }
        Ok(())
    }

    fn get_occurrence_type(
        &self,
        id: OccurrenceTypeId,
        include_deleted: bool,
    ) -> RepoResult<Option<OccurrenceType>> {
        self.conn
            .query_row(
                &format!(
                    "{OCCURRENCE_TYPE_SELECT_SQL}
                     WHERE uuid = ?1
                       AND (?2 = 1 OR deleted_at IS NULL);"
                ),
                params![id.to_string(), include_deleted],
                |row| Ok(parse_occurrence_type_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_occurrence_type_by_name(&self, name: &str) -> RepoResult<Option<OccurrenceType>> {
        self.conn
            .query_row(
                &format!("{OCCURRENCE_TYPE_SELECT_SQL} WHERE name = ?1 COLLATE NOCASE;"),
                [name.trim()],
                |row| Ok(parse_occurrence_type_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_occurrence_types(&self, query: &ListQuery) -> RepoResult<Vec<OccurrenceType>> {
        let mut sql = format!("{OCCURRENCE_TYPE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        sql.push_str(" ORDER BY name COLLATE NOCASE ASC, uuid ASC");
        query.push_paging(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut kinds = Vec::new();
        while let Some(row) = rows.next()? {
            kinds.push(parse_occurrence_type_row(row)?);
        }
        Ok(kinds)
    }

    fn loan_exists(&self, loan_id: LoanId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM loans WHERE uuid = ?1 AND deleted_at IS NULL
            );",
            [loan_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

fn occurrence_values(occurrence: &Occurrence) -> Vec<Value> {
    vec![
        Value::Text(occurrence.id.to_string()),
        Value::Text(occurrence.loan_id.to_string()),
        Value::Text(occurrence.occurrence_type_id.to_string()),
        Value::Text(occurrence.occurrence_date.to_string()),
        Value::Text(occurrence.description.clone()),
        occurrence.canceled_at.map_or(Value::Null, Value::Integer),
        optional_uuid_value(occurrence.canceled_by),
        optional_text_value(occurrence.cancellation_reason.as_deref()),
    ]
}

fn parse_occurrence_row(row: &Row<'_>) -> RepoResult<Occurrence> {
    Ok(Occurrence {
        id: get_uuid(row, "uuid")?,
        loan_id: get_uuid(row, "loan_uuid")?,
        occurrence_type_id: get_uuid(row, "occurrence_type_uuid")?,
        occurrence_date: parse_date(row, "occurrence_date")?,
        description: row.get("description")?,
        canceled_at: row.get("canceled_at")?,
        canceled_by: get_optional_uuid(row, "canceled_by")?,
        cancellation_reason: row.get("cancellation_reason")?,
        audit: parse_audit(row)?,
    })
}

fn parse_occurrence_type_row(row: &Row<'_>) -> RepoResult<OccurrenceType> {
    Ok(OccurrenceType {
        id: get_uuid(row, "uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        audit: parse_audit(row)?,
    })
}
