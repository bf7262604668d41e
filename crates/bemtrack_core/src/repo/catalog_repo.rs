//! Reference catalog repository.
//!
//! # Invariants
//! - `(kind, name)` is unique, case-insensitively.
//! - Entries are listed by kind then name.

use crate::model::catalog::{CatalogEntry, CatalogId, CatalogKind};
use crate::model::EntityKind;
use crate::repo::{
    audit_values, ensure_tables, get_optional_uuid, get_uuid, optional_uuid_value, parse_audit,
    unique_violation_column, ListQuery, RepoError, RepoResult, AUDIT_COLUMNS,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

const CATALOG_SELECT_SQL: &str = "SELECT
    uuid,
    kind,
    name,
    parent_uuid,
    created_at,
    created_by,
    updated_at,
    updated_by,
    deleted_at
FROM catalog_entries";

pub trait CatalogRepository {
    fn create_entry(&self, entry: &CatalogEntry) -> RepoResult<CatalogId>;
    fn get_entry(&self, id: CatalogId, include_deleted: bool) -> RepoResult<Option<CatalogEntry>>;
    /// Case-insensitive name lookup within one kind, deleted rows included.
    fn find_entry_by_name(&self, kind: CatalogKind, name: &str)
        -> RepoResult<Option<CatalogEntry>>;
    fn list_entries(
        &self,
        kind: Option<CatalogKind>,
        query: &ListQuery,
    ) -> RepoResult<Vec<CatalogEntry>>;
}

pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["catalog_entries"])?;
        Ok(Self { conn })
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_entry(&self, entry: &CatalogEntry) -> RepoResult<CatalogId> {
        let mut values = vec![
            Value::Text(entry.id.to_string()),
            Value::Text(entry.kind.as_str().to_string()),
            Value::Text(entry.name.clone()),
            optional_uuid_value(entry.parent_id),
        ];
        values.extend(audit_values(&entry.audit));

        self.conn
            .execute(
                &format!(
                    "INSERT INTO catalog_entries (uuid, kind, name, parent_uuid, {AUDIT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);"
                ),
                params_from_iter(values),
            )
            .map_err(|err| match unique_violation_column(&err) {
                Some(_) => RepoError::Duplicate {
                    entity: EntityKind::CatalogEntry,
                    field: "name".to_string(),
                },
                None => err.into(),
            })?;

        Ok(entry.id)
    }

    fn get_entry(&self, id: CatalogId, include_deleted: bool) -> RepoResult<Option<CatalogEntry>> {
        self.conn
            .query_row(
                &format!(
                    "{CATALOG_SELECT_SQL}
                     WHERE uuid = ?1
                       AND (?2 = 1 OR deleted_at IS NULL);"
                ),
                rusqlite::params![id.to_string(), include_deleted],
                |row| Ok(parse_catalog_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_entry_by_name(
        &self,
        kind: CatalogKind,
        name: &str,
    ) -> RepoResult<Option<CatalogEntry>> {
        self.conn
            .query_row(
                &format!(
                    "{CATALOG_SELECT_SQL}
                     WHERE kind = ?1
                       AND name = ?2 COLLATE NOCASE;"
                ),
                [kind.as_str(), name.trim()],
                |row| Ok(parse_catalog_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_entries(
        &self,
        kind: Option<CatalogKind>,
        query: &ListQuery,
    ) -> RepoResult<Vec<CatalogEntry>> {
        let mut sql = format!("{CATALOG_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if let Some(kind) = kind {
            sql.push_str(" AND kind = ?");
            bind_values.push(Value::Text(kind.as_str().to_string()));
        }
        sql.push_str(" ORDER BY kind ASC, name COLLATE NOCASE ASC, uuid ASC");
        query.push_paging(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_catalog_row(row)?);
        }
        Ok(entries)
    }
}

/// Returns the kind of a live catalog entry, `None` when missing or deleted.
///
/// Student and asset repositories use this to validate references.
pub(crate) fn catalog_entry_kind(
    conn: &Connection,
    id: CatalogId,
) -> RepoResult<Option<CatalogKind>> {
    let kind: Option<String> = conn
        .query_row(
            "SELECT kind FROM catalog_entries WHERE uuid = ?1 AND deleted_at IS NULL;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    kind.map(|value| {
        CatalogKind::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid catalog kind `{value}` in catalog_entries.kind"
            ))
        })
    })
    .transpose()
}

fn parse_catalog_row(row: &Row<'_>) -> RepoResult<CatalogEntry> {
    let kind_text: String = row.get("kind")?;
    let kind = CatalogKind::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid catalog kind `{kind_text}` in catalog_entries.kind"
        ))
    })?;

    Ok(CatalogEntry {
        id: get_uuid(row, "uuid")?,
        kind,
        name: row.get("name")?,
        parent_id: get_optional_uuid(row, "parent_uuid")?,
        audit: parse_audit(row)?,
    })
}
