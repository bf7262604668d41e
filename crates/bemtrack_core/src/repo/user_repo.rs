//! User account repository.
//!
//! Roles are persisted as a comma-separated list of role ids.

use crate::model::user::{Role, User, UserId};
use crate::model::EntityKind;
use crate::repo::{
    audit_values, bool_to_int, ensure_tables, get_uuid, map_unique_violation, parse_audit,
    RepoError, RepoResult, AUDIT_COLUMNS,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const USER_SELECT_SQL: &str = "SELECT
    uuid,
    username,
    email,
    password_salt,
    password_hash,
    roles,
    is_active,
    created_at,
    created_by,
    updated_at,
    updated_by,
    deleted_at
FROM users";

pub trait UserRepository {
    fn create_user(&self, user: &User) -> RepoResult<UserId>;
    fn update_user(&self, user: &User) -> RepoResult<()>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    /// Case-insensitive lookup of a live account.
    fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    fn count_users(&self) -> RepoResult<u64>;
}

pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["users"])?;
        Ok(Self { conn })
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, user: &User) -> RepoResult<UserId> {
        let mut values = user_values(user);
        values.extend(audit_values(&user.audit));

        self.conn
            .execute(
                &format!(
                    "INSERT INTO users (
                        uuid,
                        username,
                        email,
                        password_salt,
                        password_hash,
                        roles,
                        is_active,
                        {AUDIT_COLUMNS}
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);"
                ),
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::User))?;
        Ok(user.id)
    }

    fn update_user(&self, user: &User) -> RepoResult<()> {
        let mut values = user_values(user);
        values.extend(audit_values(&user.audit));

        let changed = self
            .conn
            .execute(
                "UPDATE users
                 SET
                    username = ?2,
                    email = ?3,
                    password_salt = ?4,
                    password_hash = ?5,
                    roles = ?6,
                    is_active = ?7,
                    updated_at = ?10,
                    updated_by = ?11,
                    deleted_at = ?12
                 WHERE uuid = ?1;",
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::User))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::User,
                id: user.id,
            });
        }
        Ok(())
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE uuid = ?1 AND deleted_at IS NULL;"),
                [id.to_string()],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.conn
            .query_row(
                &format!(
                    "{USER_SELECT_SQL}
                     WHERE username = ?1 COLLATE NOCASE
                       AND deleted_at IS NULL;"
                ),
                [username.trim()],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn count_users(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn user_values(user: &User) -> Vec<Value> {
    vec![
        Value::Text(user.id.to_string()),
        Value::Text(user.username.clone()),
        Value::Text(user.email.clone()),
        Value::Text(user.password_salt.clone()),
        Value::Text(user.password_hash.clone()),
        Value::Text(roles_to_db(&user.roles)),
        Value::Integer(bool_to_int(user.active)),
    ]
}

fn roles_to_db(roles: &BTreeSet<Role>) -> String {
    roles
        .iter()
        .map(|role| role.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_roles(value: &str) -> RepoResult<BTreeSet<Role>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Role::parse(part).ok_or_else(|| {
                RepoError::InvalidData(format!("invalid role `{part}` in users.roles"))
            })
        })
        .collect()
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let roles_text: String = row.get("roles")?;
    let active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in users.is_active"
            )));
        }
    };

    Ok(User {
        id: get_uuid(row, "uuid")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_salt: row.get("password_salt")?,
        password_hash: row.get("password_hash")?,
        roles: parse_roles(&roles_text)?,
        active,
        audit: parse_audit(row)?,
    })
}
