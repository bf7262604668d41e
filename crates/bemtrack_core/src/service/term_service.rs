//! Responsibility and return terms for loans.
//!
//! # Responsibility
//! - Check that a loan is in the right state for the requested term.
//! - Build the [`TermContext`] and hand it to a [`TermRenderer`].
//!
//! # Invariants
//! - A responsibility term needs an active loan with no return date.
//! - A return term needs a finished loan with a return date.

use crate::model::loan::{LoanId, LoanState};
use crate::model::EntityKind;
use crate::policy::{Action, Actor, Policy, Resource, RolePolicy};
use crate::repo::loan_repo::{LoanDetail, LoanRepository};
use crate::service::{observe, StateViolation, UseCaseError, UseCaseResult};
use chrono::NaiveDate;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    /// Signed by the student when the asset leaves.
    Responsibility,
    /// Issued when the asset comes back.
    Return,
}

impl TermKind {
    pub fn template_name(self) -> &'static str {
        match self {
            Self::Responsibility => "responsibility_term",
            Self::Return => "return_term",
        }
    }
}

/// Values a term template may print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermContext {
    pub kind: TermKind,
    pub loan_id: LoanId,
    pub student_name: String,
    pub student_cpf: String,
    pub student_matricula: String,
    pub asset_patrimonio: String,
    pub asset_description: String,
    pub loan_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub issued_by: String,
    pub issued_on: NaiveDate,
}

impl TermContext {
    fn from_detail(
        kind: TermKind,
        detail: LoanDetail,
        actor: &Actor,
        issued_on: NaiveDate,
    ) -> Self {
        Self {
            kind,
            loan_id: detail.loan.id,
            student_name: detail.student_name,
            student_cpf: detail.student_cpf,
            student_matricula: detail.student_matricula,
            asset_patrimonio: detail.asset_patrimonio,
            asset_description: detail.asset_description,
            loan_date: detail.loan.loan_date,
            expected_return_date: detail.loan.expected_return_date,
            actual_return_date: detail.loan.actual_return_date,
            issued_by: actor.username.clone(),
            issued_on,
        }
    }
}

/// Document rendering failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    UnknownTemplate(String),
    Failed(String),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTemplate(name) => write!(f, "unknown term template: `{name}`"),
            Self::Failed(details) => write!(f, "term rendering failed: {details}"),
        }
    }
}

impl Error for RenderError {}

/// Turns a named template plus context into document bytes.
pub trait TermRenderer {
    fn render(&self, template: &str, context: &TermContext) -> Result<Vec<u8>, RenderError>;
}

/// UTF-8 plain text renderer used by the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextTermRenderer;

impl TermRenderer for PlainTextTermRenderer {
    fn render(&self, template: &str, context: &TermContext) -> Result<Vec<u8>, RenderError> {
        let title = match template {
            "responsibility_term" => "TERM OF RESPONSIBILITY",
            "return_term" => "TERM OF RETURN",
            other => return Err(RenderError::UnknownTemplate(other.to_string())),
        };

        let mut out = String::new();
        write_term(&mut out, title, context).map_err(|err| RenderError::Failed(err.to_string()))?;
        Ok(out.into_bytes())
    }
}

fn write_term(out: &mut String, title: &str, context: &TermContext) -> std::fmt::Result {
    writeln!(out, "{title}")?;
    writeln!(out)?;
    writeln!(out, "Student: {}", context.student_name)?;
    writeln!(out, "CPF: {}", context.student_cpf)?;
    writeln!(out, "Enrollment: {}", context.student_matricula)?;
    writeln!(
        out,
        "Asset: {} - {}",
        context.asset_patrimonio, context.asset_description
    )?;
    writeln!(out, "Loan date: {}", context.loan_date)?;
    writeln!(out, "Expected return: {}", context.expected_return_date)?;
    if let Some(returned_on) = context.actual_return_date {
        writeln!(out, "Returned on: {returned_on}")?;
    }
    writeln!(out)?;
    writeln!(out, "Issued by {} on {}", context.issued_by, context.issued_on)
}

/// Failure of [`TermService::issue`].
#[derive(Debug)]
pub enum TermError {
    UseCase(UseCaseError),
    Render(RenderError),
}

impl Display for TermError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseCase(err) => write!(f, "{err}"),
            Self::Render(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TermError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UseCase(err) => Some(err),
            Self::Render(err) => Some(err),
        }
    }
}

impl From<UseCaseError> for TermError {
    fn from(value: UseCaseError) -> Self {
        Self::UseCase(value)
    }
}

impl From<RenderError> for TermError {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}

pub struct TermService<R: LoanRepository, T: TermRenderer, P: Policy = RolePolicy> {
    repo: R,
    renderer: T,
    policy: P,
}

impl<R: LoanRepository, T: TermRenderer> TermService<R, T> {
    pub fn new(repo: R, renderer: T) -> Self {
        Self::with_policy(repo, renderer, RolePolicy::for_resource(Resource::Loan))
    }
}

impl<R: LoanRepository, T: TermRenderer, P: Policy> TermService<R, T, P> {
    pub fn with_policy(repo: R, renderer: T, policy: P) -> Self {
        Self {
            repo,
            renderer,
            policy,
        }
    }

    /// Checks the loan and builds the term context without rendering.
    pub fn prepare(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        kind: TermKind,
        issued_on: NaiveDate,
    ) -> UseCaseResult<TermContext> {
        observe("term_prepare", "term", || {
            let detail = self
                .repo
                .get_loan_detail(loan_id)?
                .ok_or_else(|| UseCaseError::not_found(EntityKind::Loan, loan_id))?;
            self.policy.authorize(actor, Action::View)?;

            let loan = &detail.loan;
            match kind {
                TermKind::Responsibility => {
                    if loan.state != LoanState::Active || loan.actual_return_date.is_some() {
                        return Err(UseCaseError::InvalidState(StateViolation::LoanNotActive));
                    }
                }
                TermKind::Return => {
                    if loan.state != LoanState::Finished || loan.actual_return_date.is_none() {
                        return Err(UseCaseError::InvalidState(StateViolation::LoanNotReturned));
                    }
                }
            }
            Ok(TermContext::from_detail(kind, detail, actor, issued_on))
        })
    }

    /// Renders the requested term for a loan.
    pub fn issue(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        kind: TermKind,
        issued_on: NaiveDate,
    ) -> Result<Vec<u8>, TermError> {
        let context = self.prepare(actor, loan_id, kind, issued_on)?;
        Ok(self.renderer.render(kind.template_name(), &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{PlainTextTermRenderer, RenderError, TermContext, TermKind, TermRenderer};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn context() -> TermContext {
        TermContext {
            kind: TermKind::Return,
            loan_id: Uuid::new_v4(),
            student_name: "Ana Souza".to_string(),
            student_cpf: "52998224725".to_string(),
            student_matricula: "2024001".to_string(),
            asset_patrimonio: "PAT-001".to_string(),
            asset_description: "Notebook".to_string(),
            loan_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            expected_return_date: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            actual_return_date: Some(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()),
            issued_by: "desk".to_string(),
            issued_on: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
        }
    }

    #[test]
    fn plain_text_return_term_prints_return_date() {
        let bytes = PlainTextTermRenderer
            .render("return_term", &context())
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("TERM OF RETURN"));
        assert!(text.contains("Asset: PAT-001 - Notebook"));
        assert!(text.contains("Returned on: 2024-03-06"));
    }

    #[test]
    fn unknown_template_is_rejected() {
        let err = PlainTextTermRenderer.render("invoice", &context()).unwrap_err();
        assert_eq!(err, RenderError::UnknownTemplate("invoice".to_string()));
    }

    #[test]
    fn context_serializes_dates_as_iso_strings() {
        let value = serde_json::to_value(context()).unwrap();
        assert_eq!(value["kind"], "return");
        assert_eq!(value["loan_date"], "2024-03-01");
    }
}
