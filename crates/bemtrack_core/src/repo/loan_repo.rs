//! Loan repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist loans and answer active-loan / due-date queries.
//! - Enforce "at most one active loan per asset and per student" atomically.
//!
//! # Invariants
//! - Writes of an active loan check both parties and both conflicts inside one
//!   `BEGIN IMMEDIATE` transaction, so no other writer can interleave between
//!   check and insert.
//! - Partial unique indexes on `loans` back the same rule; a constraint hit is
//!   reported as `RepoError::ActiveLoanConflict`, never as a raw DB error.
//! - Default listing is `loan_date DESC, created_at DESC, uuid ASC`.

use crate::model::asset::AssetId;
use crate::model::loan::{Loan, LoanId, LoanState};
use crate::model::student::StudentId;
use crate::model::EntityKind;
use crate::repo::{
    audit_values, ensure_tables, get_optional_uuid, get_uuid, optional_text_value,
    optional_uuid_value, parse_audit, push_paging, unique_violation_column, RepoError, RepoResult,
    AUDIT_COLUMNS,
};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::fmt::{Display, Formatter};

const LOAN_SELECT_SQL: &str = "SELECT
    loans.uuid,
    loans.student_uuid,
    loans.asset_uuid,
    loans.loan_date,
    loans.expected_return_date,
    loans.actual_return_date,
    loans.returned_to,
    loans.state,
    loans.notes,
    loans.created_at,
    loans.created_by,
    loans.updated_at,
    loans.updated_by,
    loans.deleted_at
FROM loans";

const LOAN_ORDER_SQL: &str =
    " ORDER BY loans.loan_date DESC, loans.created_at DESC, loans.uuid ASC";

/// Which side of the active-loan rule a write would break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveLoanConflict {
    Asset(AssetId),
    Student(StudentId),
}

impl Display for ActiveLoanConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asset(_) => write!(f, "asset already has active loan"),
            Self::Student(_) => write!(f, "student already has active loan"),
        }
    }
}

/// Filter and paging options for loan listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanListQuery {
    pub include_deleted: bool,
    pub state: Option<LoanState>,
    pub student_id: Option<StudentId>,
    pub asset_id: Option<AssetId>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Inclusive expected-return-date window over active loans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueWindow {
    /// `None` means unbounded in the past.
    pub from: Option<NaiveDate>,
    pub until: NaiveDate,
}

/// Loan joined with the student/asset fields printed on terms and reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanDetail {
    pub loan: Loan,
    pub student_name: String,
    pub student_cpf: String,
    pub student_email: String,
    pub student_matricula: String,
    pub asset_patrimonio: String,
    pub asset_description: String,
}

pub trait LoanRepository {
    /// Inserts a loan; fails with `NotFound` for a missing/deleted party and
    /// with `ActiveLoanConflict` when an active loan would collide.
    fn create_loan(&self, loan: &Loan) -> RepoResult<LoanId>;
    /// Writes every column; re-checks conflicts when the loan stays active.
    fn update_loan(&self, loan: &Loan) -> RepoResult<()>;
    fn get_loan(&self, id: LoanId, include_deleted: bool) -> RepoResult<Option<Loan>>;
    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<Loan>>;
    fn find_active_loan_for_asset(&self, asset_id: AssetId) -> RepoResult<Option<Loan>>;
    fn find_active_loan_for_student(&self, student_id: StudentId) -> RepoResult<Option<Loan>>;
    /// Active loans due inside `window`, earliest due date first.
    fn list_active_loans_due(&self, window: &DueWindow) -> RepoResult<Vec<Loan>>;
    fn get_loan_detail(&self, id: LoanId) -> RepoResult<Option<LoanDetail>>;
}

pub struct SqliteLoanRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLoanRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["loans", "students", "assets"])?;
        Ok(Self { conn })
    }

    fn immediate_transaction(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl LoanRepository for SqliteLoanRepository<'_> {
    fn create_loan(&self, loan: &Loan) -> RepoResult<LoanId> {
        let tx = self.immediate_transaction()?;
        ensure_party_exists(&tx, EntityKind::Student, loan.student_id)?;
        ensure_party_exists(&tx, EntityKind::Asset, loan.asset_id)?;
        if loan.is_active() {
            ensure_no_active_conflict(&tx, loan)?;
        }

        let mut values = loan_values(loan);
        values.extend(audit_values(&loan.audit));
        tx.execute(
            &format!(
                "INSERT INTO loans (
                    uuid,
                    student_uuid,
                    asset_uuid,
                    loan_date,
                    expected_return_date,
                    actual_return_date,
                    returned_to,
                    state,
                    notes,
                    {AUDIT_COLUMNS}
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);"
            ),
            params_from_iter(values),
        )
        .map_err(|err| map_loan_write_error(err, loan))?;

        tx.commit()?;
        Ok(loan.id)
    }

    fn update_loan(&self, loan: &Loan) -> RepoResult<()> {
        let tx = self.immediate_transaction()?;
        if loan.is_active() {
            ensure_party_exists(&tx, EntityKind::Student, loan.student_id)?;
            ensure_party_exists(&tx, EntityKind::Asset, loan.asset_id)?;
            ensure_no_active_conflict(&tx, loan)?;
        }

        let mut values = loan_values(loan);
        values.extend(audit_values(&loan.audit));
        let changed = tx
            .execute(
                "UPDATE loans
                 SET
                    student_uuid = ?2,
                    asset_uuid = ?3,
                    loan_date = ?4,
                    expected_return_date = ?5,
                    actual_return_date = ?6,
                    returned_to = ?7,
                    state = ?8,
                    notes = ?9,
                    updated_at = ?12,
                    updated_by = ?13,
                    deleted_at = ?14
                 WHERE uuid = ?1;",
                params_from_iter(values),
            )
            .map_err(|err| map_loan_write_error(err, loan))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: EntityKind::Loan,
                id: loan.id,
            });
        }

        tx.commit()?;
        Ok(())
    }

    fn get_loan(&self, id: LoanId, include_deleted: bool) -> RepoResult<Option<Loan>> {
        self.conn
            .query_row(
                &format!(
                    "{LOAN_SELECT_SQL}
                     WHERE loans.uuid = ?1
                       AND (?2 = 1 OR loans.deleted_at IS NULL);"
                ),
                params![id.to_string(), include_deleted],
                |row| Ok(parse_loan_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<Loan>> {
        let mut sql = format!("{LOAN_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND loans.deleted_at IS NULL");
        }
        if let Some(state) = query.state {
            sql.push_str(" AND loans.state = ?");
            bind_values.push(Value::Text(state.as_str().to_string()));
        }
        if let Some(student_id) = query.student_id {
            sql.push_str(" AND loans.student_uuid = ?");
            bind_values.push(Value::Text(student_id.to_string()));
        }
        if let Some(asset_id) = query.asset_id {
            sql.push_str(" AND loans.asset_uuid = ?");
            bind_values.push(Value::Text(asset_id.to_string()));
        }
        sql.push_str(LOAN_ORDER_SQL);

        push_paging(&mut sql, &mut bind_values, query.limit, query.offset);

        collect_loans(self.conn, &sql, bind_values)
    }

    fn find_active_loan_for_asset(&self, asset_id: AssetId) -> RepoResult<Option<Loan>> {
        find_active_loan(self.conn, "asset_uuid", &asset_id.to_string())
    }

    fn find_active_loan_for_student(&self, student_id: StudentId) -> RepoResult<Option<Loan>> {
        find_active_loan(self.conn, "student_uuid", &student_id.to_string())
    }

    fn list_active_loans_due(&self, window: &DueWindow) -> RepoResult<Vec<Loan>> {
        let mut sql = format!(
            "{LOAN_SELECT_SQL}
             WHERE loans.state = 'active'
               AND loans.deleted_at IS NULL
               AND loans.expected_return_date <= ?"
        );
        let mut bind_values = vec![Value::Text(window.until.to_string())];
        if let Some(from) = window.from {
            sql.push_str(" AND loans.expected_return_date >= ?");
            bind_values.push(Value::Text(from.to_string()));
        }
        sql.push_str(" ORDER BY loans.expected_return_date ASC, loans.uuid ASC");

        collect_loans(self.conn, &sql, bind_values)
    }

    fn get_loan_detail(&self, id: LoanId) -> RepoResult<Option<LoanDetail>> {
        self.conn
            .query_row(
                "SELECT
                    loans.uuid,
                    loans.student_uuid,
                    loans.asset_uuid,
                    loans.loan_date,
                    loans.expected_return_date,
                    loans.actual_return_date,
                    loans.returned_to,
                    loans.state,
                    loans.notes,
                    loans.created_at,
                    loans.created_by,
                    loans.updated_at,
                    loans.updated_by,
                    loans.deleted_at,
                    students.name AS student_name,
                    students.cpf AS student_cpf,
                    students.email AS student_email,
                    students.matricula AS student_matricula,
                    assets.patrimonio AS asset_patrimonio,
                    assets.description AS asset_description
                 FROM loans
                 INNER JOIN students ON students.uuid = loans.student_uuid
                 INNER JOIN assets ON assets.uuid = loans.asset_uuid
                 WHERE loans.uuid = ?1
                   AND loans.deleted_at IS NULL;",
                [id.to_string()],
                |row| Ok(parse_loan_detail_row(row)),
            )
            .optional()?
            .transpose()
    }
}

fn ensure_party_exists(conn: &Connection, entity: EntityKind, id: uuid::Uuid) -> RepoResult<()> {
    let table = match entity {
        EntityKind::Student => "students",
        EntityKind::Asset => "assets",
        other => {
            return Err(RepoError::InvalidData(format!(
                "{other} cannot be a loan party"
            )))
        }
    };
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(
                SELECT 1 FROM {table} WHERE uuid = ?1 AND deleted_at IS NULL
            );"
        ),
        [id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::NotFound { entity, id })
    }
}

/// Asset side is checked before student side.
fn ensure_no_active_conflict(conn: &Connection, loan: &Loan) -> RepoResult<()> {
    if other_active_loan_exists(conn, "asset_uuid", &loan.asset_id.to_string(), loan.id)? {
        return Err(RepoError::ActiveLoanConflict(ActiveLoanConflict::Asset(
            loan.asset_id,
        )));
    }
    if other_active_loan_exists(conn, "student_uuid", &loan.student_id.to_string(), loan.id)? {
        return Err(RepoError::ActiveLoanConflict(ActiveLoanConflict::Student(
            loan.student_id,
        )));
    }
    Ok(())
}

fn other_active_loan_exists(
    conn: &Connection,
    column: &'static str,
    party: &str,
    exclude: LoanId,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(
                SELECT 1
                FROM loans
                WHERE {column} = ?1
                  AND uuid <> ?2
                  AND state = 'active'
                  AND deleted_at IS NULL
            );"
        ),
        [party, exclude.to_string().as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn find_active_loan(
    conn: &Connection,
    column: &'static str,
    party: &str,
) -> RepoResult<Option<Loan>> {
    conn.query_row(
        &format!(
            "{LOAN_SELECT_SQL}
             WHERE loans.{column} = ?1
               AND loans.state = 'active'
               AND loans.deleted_at IS NULL;"
        ),
        [party],
        |row| Ok(parse_loan_row(row)),
    )
    .optional()?
    .transpose()
}

fn collect_loans(conn: &Connection, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<Loan>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut loans = Vec::new();
    while let Some(row) = rows.next()? {
        loans.push(parse_loan_row(row)?);
    }
    Ok(loans)
}

fn map_loan_write_error(err: rusqlite::Error, loan: &Loan) -> RepoError {
    match unique_violation_column(&err).as_deref() {
        Some("asset_uuid") => {
            RepoError::ActiveLoanConflict(ActiveLoanConflict::Asset(loan.asset_id))
        }
        Some("student_uuid") => {
            RepoError::ActiveLoanConflict(ActiveLoanConflict::Student(loan.student_id))
        }
        Some(field) => RepoError::Duplicate {
            entity: EntityKind::Loan,
            field: field.to_string(),
        },
        None => err.into(),
    }
}

fn loan_values(loan: &Loan) -> Vec<Value> {
    vec![
        Value::Text(loan.id.to_string()),
        Value::Text(loan.student_id.to_string()),
        Value::Text(loan.asset_id.to_string()),
        Value::Text(loan.loan_date.to_string()),
        Value::Text(loan.expected_return_date.to_string()),
        loan.actual_return_date
            .map_or(Value::Null, |date| Value::Text(date.to_string())),
        optional_uuid_value(loan.returned_to),
        Value::Text(loan.state.as_str().to_string()),
        optional_text_value(loan.notes.as_deref()),
    ]
}

fn parse_loan_row(row: &Row<'_>) -> RepoResult<Loan> {
    let state_text: String = row.get("state")?;
    let state = LoanState::parse(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid loan state `{state_text}` in loans.state"))
    })?;

    let loan = Loan {
        id: get_uuid(row, "uuid")?,
        student_id: get_uuid(row, "student_uuid")?,
        asset_id: get_uuid(row, "asset_uuid")?,
        loan_date: parse_date(row, "loan_date")?,
        expected_return_date: parse_date(row, "expected_return_date")?,
        actual_return_date: parse_optional_date(row, "actual_return_date")?,
        returned_to: get_optional_uuid(row, "returned_to")?,
        state,
        notes: row.get("notes")?,
        audit: parse_audit(row)?,
    };
    loan.validate()
        .map_err(|err| RepoError::InvalidData(format!("loan {}: {err}", loan.id)))?;
    Ok(loan)
}

fn parse_loan_detail_row(row: &Row<'_>) -> RepoResult<LoanDetail> {
    Ok(LoanDetail {
        loan: parse_loan_row(row)?,
        student_name: row.get("student_name")?,
        student_cpf: row.get("student_cpf")?,
        student_email: row.get("student_email")?,
        student_matricula: row.get("student_matricula")?,
        asset_patrimonio: row.get("asset_patrimonio")?,
        asset_description: row.get("asset_description")?,
    })
}

pub(crate) fn parse_date(row: &Row<'_>, column: &str) -> RepoResult<NaiveDate> {
    let text: String = row.get(column)?;
    text.parse::<NaiveDate>()
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{text}` in {column}")))
}

pub(crate) fn parse_optional_date(row: &Row<'_>, column: &str) -> RepoResult<Option<NaiveDate>> {
    let text: Option<String> = row.get(column)?;
    text.map(|value| {
        value
            .parse::<NaiveDate>()
            .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
    })
    .transpose()
}
