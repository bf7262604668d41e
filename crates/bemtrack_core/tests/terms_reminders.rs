mod common;

use bemtrack_core::model::user::Role;
use bemtrack_core::repo::loan_repo::SqliteLoanRepository;
use bemtrack_core::service::reminder_service::{
    MailError, Mailer, ReminderService, ReminderSettings, ReminderSummary,
};
use bemtrack_core::service::term_service::{
    PlainTextTermRenderer, RenderError, TermContext, TermError, TermKind, TermRenderer,
    TermService,
};
use bemtrack_core::{open_db_in_memory, StateViolation, UseCaseError};
use common::{
    bootstrap_admin, day, loans, open_loan, register_asset, register_student, seed_catalog,
    user_with_roles,
};
use std::cell::RefCell;

#[test]
fn responsibility_term_needs_an_active_loan() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let student = register_student(&conn, &admin, &catalog, 0);
    let asset = register_asset(&conn, &admin, &catalog, "PAT-001");
    let loan = open_loan(&conn, &admin, &student, &asset, day(2024, 3, 1), day(2024, 3, 8));
    let terms = TermService::new(
        SqliteLoanRepository::try_new(&conn).unwrap(),
        PlainTextTermRenderer,
    );

    let bytes = terms
        .issue(&admin, loan.id, TermKind::Responsibility, day(2024, 3, 1))
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("TERM OF RESPONSIBILITY"));
    assert!(text.contains("Student: Student 0"));
    assert!(text.contains("CPF: 52998224725"));
    assert!(text.contains("Issued by admin on 2024-03-01"));

    let early = terms
        .prepare(&admin, loan.id, TermKind::Return, day(2024, 3, 1))
        .unwrap_err();
    assert!(matches!(
        early,
        UseCaseError::InvalidState(StateViolation::LoanNotReturned)
    ));
}

#[test]
fn return_term_needs_a_finished_loan() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let auditor = user_with_roles(&conn, &admin, "audit", &[Role::Auditor]);
    let student = register_student(&conn, &admin, &catalog, 0);
    let asset = register_asset(&conn, &admin, &catalog, "PAT-001");
    let loan = open_loan(&conn, &admin, &student, &asset, day(2024, 3, 1), day(2024, 3, 8));
    loans(&conn)
        .register_return(&admin, loan.id, day(2024, 3, 6))
        .unwrap();
    let terms = TermService::new(
        SqliteLoanRepository::try_new(&conn).unwrap(),
        PlainTextTermRenderer,
    );

    let context = terms
        .prepare(&auditor, loan.id, TermKind::Return, day(2024, 3, 6))
        .unwrap();
    assert_eq!(context.actual_return_date, Some(day(2024, 3, 6)));
    assert_eq!(context.asset_patrimonio, "PAT-001");
    assert_eq!(context.issued_by, "audit");

    let late = terms
        .issue(&admin, loan.id, TermKind::Responsibility, day(2024, 3, 6))
        .unwrap_err();
    assert!(matches!(
        late,
        TermError::UseCase(UseCaseError::InvalidState(StateViolation::LoanNotActive))
    ));
}

struct BrokenRenderer;

impl TermRenderer for BrokenRenderer {
    fn render(&self, _template: &str, _context: &TermContext) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Failed("printer on fire".to_string()))
    }
}

#[test]
fn renderer_failures_surface_as_render_errors() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let student = register_student(&conn, &admin, &catalog, 0);
    let asset = register_asset(&conn, &admin, &catalog, "PAT-001");
    let loan = open_loan(&conn, &admin, &student, &asset, day(2024, 3, 1), day(2024, 3, 8));
    let terms = TermService::new(SqliteLoanRepository::try_new(&conn).unwrap(), BrokenRenderer);

    let err = terms
        .issue(&admin, loan.id, TermKind::Responsibility, day(2024, 3, 1))
        .unwrap_err();
    assert!(matches!(err, TermError::Render(RenderError::Failed(_))));
}

/// Records messages; rejects recipients listed in `reject`.
#[derive(Default)]
struct RecordingMailer {
    reject: Vec<String>,
    sent: RefCell<Vec<(String, String)>>,
}

impl Mailer for RecordingMailer {
    fn send(
        &self,
        message: &str,
        recipients: &[String],
        subject: &str,
    ) -> Result<usize, MailError> {
        if recipients.iter().any(|to| self.reject.contains(to)) {
            return Err(MailError("mailbox unavailable".to_string()));
        }
        for to in recipients {
            self.sent
                .borrow_mut()
                .push((to.clone(), format!("{subject}\n{message}")));
        }
        Ok(recipients.len())
    }
}

#[test]
fn reminders_go_to_students_with_loans_due_in_window() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let due_tomorrow = register_student(&conn, &admin, &catalog, 0);
    let due_today = register_student(&conn, &admin, &catalog, 1);
    let due_later = register_student(&conn, &admin, &catalog, 2);
    let overdue = register_student(&conn, &admin, &catalog, 3);
    for (student, tag, due) in [
        (&due_tomorrow, "PAT-1", 11),
        (&due_today, "PAT-2", 10),
        (&due_later, "PAT-3", 20),
        (&overdue, "PAT-4", 5),
    ] {
        let asset = register_asset(&conn, &admin, &catalog, tag);
        open_loan(&conn, &admin, student, &asset, day(2024, 3, 1), day(2024, 3, due));
    }

    let mailer = RecordingMailer {
        reject: vec![due_today.email.clone()],
        ..RecordingMailer::default()
    };
    let service = ReminderService::new(
        SqliteLoanRepository::try_new(&conn).unwrap(),
        mailer,
        ReminderSettings {
            window_days: 2,
            sender: "Asset desk".to_string(),
        },
    );

    let summary = service.send_due_reminders(day(2024, 3, 10)).unwrap();
    assert_eq!(
        summary,
        ReminderSummary {
            considered: 2,
            sent: 1,
            failed: 1,
        }
    );
}

#[test]
fn reminder_message_names_asset_and_due_date() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let student = register_student(&conn, &admin, &catalog, 0);
    let asset = register_asset(&conn, &admin, &catalog, "PAT-001");
    open_loan(&conn, &admin, &student, &asset, day(2024, 3, 1), day(2024, 3, 8));

    let mailer = RecordingMailer::default();
    let service = ReminderService::new(
        SqliteLoanRepository::try_new(&conn).unwrap(),
        &mailer,
        ReminderSettings {
            window_days: 2,
            sender: "Campus Centro asset desk".to_string(),
        },
    );
    let summary = service.send_due_reminders(day(2024, 3, 7)).unwrap();
    assert_eq!(summary.sent, 1);

    let sent = mailer.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "student0@escola.edu.br");
    assert!(sent[0].1.starts_with("Return reminder: asset PAT-001"));
    assert!(sent[0].1.contains("is due back on 2024-03-08"));
    assert!(sent[0].1.contains("Campus Centro asset desk"));
}
