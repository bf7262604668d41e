//! Asset (bem) repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `patrimonio` is unique across live and deleted rows.
//! - Listing orders by `patrimonio`.

use crate::model::asset::{Asset, AssetId};
use crate::model::catalog::{CatalogId, CatalogKind};
use crate::model::EntityKind;
use crate::repo::catalog_repo::catalog_entry_kind;
use crate::repo::{
    audit_values, ensure_tables, get_uuid, map_unique_violation, optional_text_value,
    parse_audit, ListQuery, RepoError, RepoResult, AUDIT_COLUMNS,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const ASSET_SELECT_SQL: &str = "SELECT
    uuid,
    patrimonio,
    description,
    serial_number,
    asset_type_uuid,
    fragility_uuid,
    condition_uuid,
    brand_model_uuid,
    created_at,
    created_by,
    updated_at,
    updated_by,
    deleted_at
FROM assets";

pub trait AssetRepository {
    fn create_asset(&self, asset: &Asset) -> RepoResult<AssetId>;
    /// Writes every column, including the tombstone.
    fn update_asset(&self, asset: &Asset) -> RepoResult<()>;
    fn get_asset(&self, id: AssetId, include_deleted: bool) -> RepoResult<Option<Asset>>;
    fn list_assets(&self, query: &ListQuery) -> RepoResult<Vec<Asset>>;
    /// Tag lookup over live and deleted rows.
    fn find_asset_by_patrimonio(&self, patrimonio: &str) -> RepoResult<Option<Asset>>;
    fn has_active_loan(&self, id: AssetId) -> RepoResult<bool>;
    fn catalog_entry_kind(&self, id: CatalogId) -> RepoResult<Option<CatalogKind>>;
}

pub struct SqliteAssetRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAssetRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["assets", "catalog_entries", "loans"])?;
        Ok(Self { conn })
    }
}

impl AssetRepository for SqliteAssetRepository<'_> {
    fn create_asset(&self, asset: &Asset) -> RepoResult<AssetId> {
        let mut values = asset_values(asset);
        values.extend(audit_values(&asset.audit));

        self.conn
            .execute(
                &format!(
                    "INSERT INTO assets (
                        uuid,
                        patrimonio,
                        description,
                        serial_number,
                        asset_type_uuid,
                        fragility_uuid,
                        condition_uuid,
                        brand_model_uuid,
                        {AUDIT_COLUMNS}
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);"
                ),
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Asset))?;

        Ok(asset.id)
    }

    fn update_asset(&self, asset: &Asset) -> RepoResult<()> {
        let mut values = asset_values(asset);
        values.extend(audit_values(&asset.audit));

        let changed = self
            .conn
            .execute(
                "UPDATE assets
                 SET
                    patrimonio = ?2,
                    description = ?3,
                    serial_number = ?4,
                    asset_type_uuid = ?5,
                    fragility_uuid = ?6,
                    condition_uuid = ?7,
                    brand_model_uuid = ?8,
                    updated_at = ?11,
                    updated_by = ?12,
                    deleted_at = ?13
                 WHERE uuid = ?1;",
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Asset))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Asset,
                id: asset.id,
            });
        }
        Ok(())
    }

    fn get_asset(&self, id: AssetId, include_deleted: bool) -> RepoResult<Option<Asset>> {
        self.conn
            .query_row(
                &format!(
                    "{ASSET_SELECT_SQL}
                     WHERE uuid = ?1
                       AND (?2 = 1 OR deleted_at IS NULL);"
                ),
                params![id.to_string(), include_deleted],
                |row| Ok(parse_asset_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_assets(&self, query: &ListQuery) -> RepoResult<Vec<Asset>> {
        let mut sql = format!("{ASSET_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        sql.push_str(" ORDER BY patrimonio ASC, uuid ASC");
        query.push_paging(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut assets = Vec::new();
        while let Some(row) = rows.next()? {
            assets.push(parse_asset_row(row)?);
        }
        Ok(assets)
    }

    fn find_asset_by_patrimonio(&self, patrimonio: &str) -> RepoResult<Option<Asset>> {
        self.conn
            .query_row(
                &format!("{ASSET_SELECT_SQL} WHERE patrimonio = ?1;"),
                [patrimonio.trim()],
                |row| Ok(parse_asset_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn has_active_loan(&self, id: AssetId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM loans
                WHERE asset_uuid = ?1
                  AND state = 'active'
                  AND deleted_at IS NULL
            );",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn catalog_entry_kind(&self, id: CatalogId) -> RepoResult<Option<CatalogKind>> {
        catalog_entry_kind(self.conn, id)
    }
}

fn asset_values(asset: &Asset) -> Vec<Value> {
    vec![
        Value::Text(asset.id.to_string()),
        Value::Text(asset.patrimonio.clone()),
        Value::Text(asset.description.clone()),
        optional_text_value(asset.serial_number.as_deref()),
        Value::Text(asset.asset_type_id.to_string()),
        Value::Text(asset.fragility_id.to_string()),
        Value::Text(asset.condition_id.to_string()),
        Value::Text(asset.brand_model_id.to_string()),
    ]
}

fn parse_asset_row(row: &Row<'_>) -> RepoResult<Asset> {
    Ok(Asset {
        id: get_uuid(row, "uuid")?,
        patrimonio: row.get("patrimonio")?,
        description: row.get("description")?,
        serial_number: row.get("serial_number")?,
        asset_type_id: get_uuid(row, "asset_type_uuid")?,
        fragility_id: get_uuid(row, "fragility_uuid")?,
        condition_id: get_uuid(row, "condition_uuid")?,
        brand_model_id: get_uuid(row, "brand_model_uuid")?,
        audit: parse_audit(row)?,
    })
}
