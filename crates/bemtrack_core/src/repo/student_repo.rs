//! Student repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `cpf`, `email` and `matricula` are unique across live and deleted rows,
//!   so a deleted student is restored rather than re-registered.
//! - Listing orders by name, then uuid.

use crate::model::catalog::{CatalogId, CatalogKind};
use crate::model::student::{Student, StudentId};
use crate::model::EntityKind;
use crate::repo::catalog_repo::catalog_entry_kind;
use crate::repo::{
    audit_values, ensure_tables, get_uuid, map_unique_violation, optional_text_value,
    parse_audit, ListQuery, RepoError, RepoResult, AUDIT_COLUMNS,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const STUDENT_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    cpf,
    email,
    matricula,
    phone,
    course_uuid,
    admission_method_uuid,
    created_at,
    created_by,
    updated_at,
    updated_by,
    deleted_at
FROM students";

/// Unique key a student can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentKey<'a> {
    Cpf(&'a str),
    Email(&'a str),
    Matricula(&'a str),
}

impl StudentKey<'_> {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Cpf(_) => "cpf",
            Self::Email(_) => "email",
            Self::Matricula(_) => "matricula",
        }
    }

    fn value(&self) -> &str {
        match self {
            Self::Cpf(value) | Self::Email(value) | Self::Matricula(value) => value,
        }
    }
}

pub trait StudentRepository {
    fn create_student(&self, student: &Student) -> RepoResult<StudentId>;
    /// Writes every column, including the tombstone.
    fn update_student(&self, student: &Student) -> RepoResult<()>;
    fn get_student(&self, id: StudentId, include_deleted: bool) -> RepoResult<Option<Student>>;
    fn list_students(&self, query: &ListQuery) -> RepoResult<Vec<Student>>;
    /// Unique-key lookup over live and deleted rows.
    fn find_student_by(&self, key: StudentKey<'_>) -> RepoResult<Option<Student>>;
    fn has_active_loan(&self, id: StudentId) -> RepoResult<bool>;
    fn catalog_entry_kind(&self, id: CatalogId) -> RepoResult<Option<CatalogKind>>;
}

pub struct SqliteStudentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStudentRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["students", "catalog_entries", "loans"])?;
        Ok(Self { conn })
    }
}

impl StudentRepository for SqliteStudentRepository<'_> {
    fn create_student(&self, student: &Student) -> RepoResult<StudentId> {
        let mut values = student_values(student);
        values.extend(audit_values(&student.audit));

        self.conn
            .execute(
                &format!(
                    "INSERT INTO students (
                        uuid,
                        name,
                        cpf,
                        email,
                        matricula,
                        phone,
                        course_uuid,
                        admission_method_uuid,
                        {AUDIT_COLUMNS}
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);"
                ),
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Student))?;

        Ok(student.id)
    }

    fn update_student(&self, student: &Student) -> RepoResult<()> {
        let mut values = student_values(student);
        values.extend(audit_values(&student.audit));

        let changed = self
            .conn
            .execute(
                "UPDATE students
                 SET
                    name = ?2,
                    cpf = ?3,
                    email = ?4,
                    matricula = ?5,
                    phone = ?6,
                    course_uuid = ?7,
                    admission_method_uuid = ?8,
                    updated_at = ?11,
                    updated_by = ?12,
                    deleted_at = ?13
                 WHERE uuid = ?1;",
                params_from_iter(values),
            )
            .map_err(|err| map_unique_violation(err, EntityKind::Student))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Student,
                id: student.id,
            });
        }
        Ok(())
    }

    fn get_student(&self, id: StudentId, include_deleted: bool) -> RepoResult<Option<Student>> {
        self.conn
            .query_row(
                &format!(
                    "{STUDENT_SELECT_SQL}
                     WHERE uuid = ?1
                       AND (?2 = 1 OR deleted_at IS NULL);"
                ),
                params![id.to_string(), include_deleted],
                |row| Ok(parse_student_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_students(&self, query: &ListQuery) -> RepoResult<Vec<Student>> {
        let mut sql = format!("{STUDENT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        sql.push_str(" ORDER BY name COLLATE NOCASE ASC, uuid ASC");
        query.push_paging(&mut sql, &mut bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }
        Ok(students)
    }

    fn find_student_by(&self, key: StudentKey<'_>) -> RepoResult<Option<Student>> {
        // Column name comes from a closed enum, never from input.
        let sql = format!("{STUDENT_SELECT_SQL} WHERE {} = ?1;", key.field());
        self.conn
            .query_row(&sql, [key.value()], |row| Ok(parse_student_row(row)))
            .optional()?
            .transpose()
    }

    fn has_active_loan(&self, id: StudentId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM loans
                WHERE student_uuid = ?1
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

fn student_values(student: &Student) -> Vec<Value> {
    vec![
        Value::Text(student.id.to_string()),
        Value::Text(student.name.clone()),
        Value::Text(student.cpf.clone()),
        Value::Text(student.email.clone()),
        Value::Text(student.matricula.clone()),
        optional_text_value(student.phone.as_deref()),
        Value::Text(student.course_id.to_string()),
        Value::Text(student.admission_method_id.to_string()),
    ]
}

fn parse_student_row(row: &Row<'_>) -> RepoResult<Student> {
    Ok(Student {
        id: get_uuid(row, "uuid")?,
        name: row.get("name")?,
        cpf: row.get("cpf")?,
        email: row.get("email")?,
        matricula: row.get("matricula")?,
        phone: row.get("phone")?,
        course_id: get_uuid(row, "course_uuid")?,
        admission_method_id: get_uuid(row, "admission_method_uuid")?,
        audit: parse_audit(row)?,
    })
}
