//! Due-date reminder mailing.
//!
//! Scheduling is external (cron or similar); one call sends one round.

use crate::repo::loan_repo::LoanRepository;
use crate::service::loan_service::due_window;
use crate::service::{observe, UseCaseResult};
use chrono::NaiveDate;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Outbound mail failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailError(pub String);

impl Display for MailError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "mail delivery failed: {}", self.0)
    }
}

impl Error for MailError {}

/// Mail transport collaborator.
pub trait Mailer {
    /// Sends `message` to every recipient and returns how many accepted it.
    fn send(
        &self,
        message: &str,
        recipients: &[String],
        subject: &str,
    ) -> Result<usize, MailError>;
}

impl<M: Mailer + ?Sized> Mailer for &M {
    fn send(
        &self,
        message: &str,
        recipients: &[String],
        subject: &str,
    ) -> Result<usize, MailError> {
        (**self).send(message, recipients, subject)
    }
}

/// Mailer that only writes a metadata line per message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(
        &self,
        message: &str,
        recipients: &[String],
        subject: &str,
    ) -> Result<usize, MailError> {
        info!(
            "event=mail_send module=reminder status=logged recipients={} subject_len={} body_len={}",
            recipients.len(),
            subject.len(),
            message.len()
        );
        Ok(recipients.len())
    }
}

/// Result of one reminder round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderSummary {
    pub considered: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Reminder round settings, usually taken from `[reminders]` config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    pub window_days: u32,
    /// Signature line closing every message.
    pub sender: String,
}

pub struct ReminderService<R: LoanRepository, M: Mailer> {
    repo: R,
    mailer: M,
    settings: ReminderSettings,
}

impl<R: LoanRepository, M: Mailer> ReminderService<R, M> {
    pub fn new(repo: R, mailer: M, settings: ReminderSettings) -> Self {
        Self {
            repo,
            mailer,
            settings,
        }
    }

    /// Mails every student whose active loan falls due between `today` and
    /// `today + window_days`.
    ///
    /// A failed delivery is counted and does not stop the round.
    pub fn send_due_reminders(&self, today: NaiveDate) -> UseCaseResult<ReminderSummary> {
        observe("reminder_round", "reminder", || {
            let loans = self
                .repo
                .list_active_loans_due(&due_window(today, self.settings.window_days))?;
            let mut summary = ReminderSummary {
                considered: loans.len(),
                ..ReminderSummary::default()
            };

            for loan in loans {
                let Some(detail) = self.repo.get_loan_detail(loan.id)? else {
                    summary.failed += 1;
                    continue;
                };
                let subject = format!("Return reminder: asset {}", detail.asset_patrimonio);
                let message = format!(
                    "Hello {},\n\nThe asset {} ({}) borrowed on {} is due back on {}.\n\n{}\n",
                    detail.student_name,
                    detail.asset_patrimonio,
                    detail.asset_description,
                    detail.loan.loan_date,
                    detail.loan.expected_return_date,
                    self.settings.sender
                );
                match self
                    .mailer
                    .send(&message, &[detail.student_email.clone()], &subject)
                {
                    Ok(accepted) if accepted > 0 => summary.sent += 1,
                    Ok(_) => summary.failed += 1,
                    Err(err) => {
                        warn!(
                            "event=reminder_send module=reminder status=error loan_id={} error={}",
                            loan.id, err
                        );
                        summary.failed += 1;
                    }
                }
            }

            info!(
                "event=reminder_summary module=reminder considered={} sent={} failed={}",
                summary.considered, summary.sent, summary.failed
            );
            Ok(summary)
        })
    }
}
