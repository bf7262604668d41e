//! bemtrack command line front end.
//!
//! # Responsibility
//! - Resolve config, start logging, open the database.
//! - Authenticate the caller and dispatch to core services.
//! - Print records as plain text lines.

mod cli;

use anyhow::{anyhow, bail, Context, Result};
use bemtrack_core::config::BemtrackConfig;
use bemtrack_core::model::asset::{Asset, AssetInput};
use bemtrack_core::model::catalog::CatalogEntry;
use bemtrack_core::model::loan::{Loan, LoanInput, LoanState};
use bemtrack_core::model::occurrence::{Occurrence, OccurrenceInput, OccurrenceType};
use bemtrack_core::model::student::{Student, StudentInput};
use bemtrack_core::repo::asset_repo::SqliteAssetRepository;
use bemtrack_core::repo::catalog_repo::SqliteCatalogRepository;
use bemtrack_core::repo::loan_repo::{LoanListQuery, SqliteLoanRepository};
use bemtrack_core::repo::occurrence_repo::{OccurrenceListQuery, SqliteOccurrenceRepository};
use bemtrack_core::repo::student_repo::SqliteStudentRepository;
use bemtrack_core::repo::user_repo::SqliteUserRepository;
use bemtrack_core::service::asset_service::AssetService;
use bemtrack_core::service::auth_service::{AuthService, NewUser};
use bemtrack_core::service::catalog_service::CatalogService;
use bemtrack_core::service::loan_service::{default_due_date, LoanEdit, LoanService};
use bemtrack_core::service::occurrence_service::{OccurrenceEdit, OccurrenceService};
use bemtrack_core::service::reminder_service::{LogMailer, ReminderService, ReminderSettings};
use bemtrack_core::service::student_service::StudentService;
use bemtrack_core::service::term_service::{PlainTextTermRenderer, TermKind, TermService};
use bemtrack_core::{init_logging, open_db, Actor, Connection, ListQuery};
use chrono::{Local, NaiveDate};
use clap::Parser;
use cli::{
    AssetCommand, AssetFields, CatalogCommand, Cli, Commands, LoanCommand, LoanStateArg,
    OccurrenceCommand, OccurrenceTypeCommand, StudentCommand, StudentFields, TermKindArg,
    UserCommand,
};
use log::info;
use std::collections::BTreeSet;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BemtrackConfig::resolve(cli.config.as_deref())?;
    if let Err(err) = init_logging(&config.log_level, &config.log_dir) {
        eprintln!("warning: logging disabled: {err}");
    }

    let conn = open_db(&config.database_path).with_context(|| {
        format!(
            "failed to open database `{}`",
            config.database_path.display()
        )
    })?;
    info!("event=cli_start module=cli status=ok");

    if let Commands::Init {
        username,
        email,
        admin_password,
    } = &cli.command
    {
        return init(&conn, username, email, admin_password);
    }

    let actor = authenticate(&conn, &cli)?;
    run(&conn, &config, &actor, cli.command)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn init(conn: &Connection, username: &str, email: &str, password: &str) -> Result<()> {
    let auth = AuthService::new(SqliteUserRepository::try_new(conn)?);
    if !auth.needs_bootstrap()? {
        bail!("database is already initialized");
    }
    let admin = auth.register_user(
        None,
        &NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            roles: BTreeSet::new(),
        },
    )?;
    println!("initialized; administrator {} ({})", admin.username, admin.id);
    Ok(())
}

fn authenticate(conn: &Connection, cli: &Cli) -> Result<Actor> {
    let (Some(username), Some(password)) = (cli.user.as_deref(), cli.password.as_deref()) else {
        bail!("--user and --password (or BEMTRACK_USER / BEMTRACK_PASSWORD) are required");
    };
    AuthService::new(SqliteUserRepository::try_new(conn)?)
        .authenticate(username, password)?
        .ok_or_else(|| anyhow!("authentication failed"))
}

fn run(conn: &Connection, config: &BemtrackConfig, actor: &Actor, command: Commands) -> Result<()> {
    match command {
        Commands::Init { .. } => bail!("init runs before authentication"),
        Commands::User(command) => run_user(conn, actor, command),
        Commands::Catalog(command) => run_catalog(conn, actor, command),
        Commands::Student(command) => run_student(conn, actor, command),
        Commands::Asset(command) => run_asset(conn, actor, command),
        Commands::Loan(command) => run_loan(conn, config, actor, command),
        Commands::OccurrenceType(command) => run_occurrence_type(conn, actor, command),
        Commands::Occurrence(command) => run_occurrence(conn, actor, command),
        Commands::Term {
            kind,
            loan_id,
            output,
        } => {
            let kind = match kind {
                TermKindArg::Responsibility => TermKind::Responsibility,
                TermKindArg::Return => TermKind::Return,
            };
            let service =
                TermService::new(SqliteLoanRepository::try_new(conn)?, PlainTextTermRenderer);
            let bytes = service.issue(actor, loan_id, kind, today())?;
            match output {
                Some(path) => std::fs::write(&path, bytes)
                    .with_context(|| format!("failed to write `{}`", path.display()))?,
                None => print!("{}", String::from_utf8_lossy(&bytes)),
            }
            Ok(())
        }
        Commands::Remind { today: reference } => {
            let service = ReminderService::new(
                SqliteLoanRepository::try_new(conn)?,
                LogMailer,
                ReminderSettings {
                    window_days: config.reminders.window_days,
                    sender: config.reminders.sender.clone(),
                },
            );
            let summary = service.send_due_reminders(reference.unwrap_or_else(today))?;
            println!(
                "considered={} sent={} failed={}",
                summary.considered, summary.sent, summary.failed
            );
            Ok(())
        }
    }
}

fn run_user(conn: &Connection, actor: &Actor, command: UserCommand) -> Result<()> {
    let service = AuthService::new(SqliteUserRepository::try_new(conn)?);
    match command {
        UserCommand::Add {
            username,
            email,
            new_password,
            roles,
        } => {
            let user = service.register_user(
                Some(actor),
                &NewUser {
                    username,
                    email,
                    password: new_password,
                    roles: roles.into_iter().map(Into::into).collect(),
                },
            )?;
            println!("{}\t{}", user.id, user.username);
        }
        UserCommand::Disable { id } => {
            service.set_active(actor, id, false)?;
        }
        UserCommand::Enable { id } => {
            service.set_active(actor, id, true)?;
        }
        UserCommand::Password { id, new_password } => {
            service.change_password(actor, id, &new_password)?;
        }
    }
    Ok(())
}

fn run_catalog(conn: &Connection, actor: &Actor, command: CatalogCommand) -> Result<()> {
    let service = CatalogService::new(SqliteCatalogRepository::try_new(conn)?);
    match command {
        CatalogCommand::Add { kind, name, parent } => {
            print_catalog_entry(&service.register(actor, kind, &name, parent)?);
        }
        CatalogCommand::List {
            kind,
            include_deleted,
        } => {
            for entry in service.list(actor, kind, &list_query(include_deleted))? {
                print_catalog_entry(&entry);
            }
        }
        CatalogCommand::Show { id } => print_catalog_entry(&service.get(actor, id, false)?),
    }
    Ok(())
}

fn run_student(conn: &Connection, actor: &Actor, command: StudentCommand) -> Result<()> {
    let service = StudentService::new(SqliteStudentRepository::try_new(conn)?);
    match command {
        StudentCommand::Add(fields) => {
            print_student(&service.register(actor, &student_input(fields))?)
        }
        StudentCommand::Edit { id, fields } => {
            print_student(&service.edit(actor, id, &student_input(fields))?)
        }
        StudentCommand::List { include_deleted } => {
            for student in service.list(actor, &list_query(include_deleted))? {
                print_student(&student);
            }
        }
        StudentCommand::Show {
            id,
            include_deleted,
        } => print_student(&service.get(actor, id, include_deleted)?),
        StudentCommand::Remove { id } => service.remove(actor, id)?,
        StudentCommand::Restore { id } => print_student(&service.restore(actor, id)?),
    }
    Ok(())
}

fn run_asset(conn: &Connection, actor: &Actor, command: AssetCommand) -> Result<()> {
    let service = AssetService::new(SqliteAssetRepository::try_new(conn)?);
    match command {
        AssetCommand::Add(fields) => print_asset(&service.register(actor, &asset_input(fields))?),
        AssetCommand::Edit { id, fields } => {
            print_asset(&service.edit(actor, id, &asset_input(fields))?)
        }
        AssetCommand::List { include_deleted } => {
            for asset in service.list(actor, &list_query(include_deleted))? {
                print_asset(&asset);
            }
        }
        AssetCommand::Show {
            id,
            include_deleted,
        } => print_asset(&service.get(actor, id, include_deleted)?),
        AssetCommand::Remove { id } => service.remove(actor, id)?,
        AssetCommand::Restore { id } => print_asset(&service.restore(actor, id)?),
    }
    Ok(())
}

fn run_loan(
    conn: &Connection,
    config: &BemtrackConfig,
    actor: &Actor,
    command: LoanCommand,
) -> Result<()> {
    let service = LoanService::new(SqliteLoanRepository::try_new(conn)?);
    match command {
        LoanCommand::Open {
            student,
            asset,
            loan_date,
            due,
            notes,
        } => {
            let loan_date = loan_date.unwrap_or_else(today);
            let expected_return_date = due.unwrap_or_else(|| {
                default_due_date(loan_date, config.loans.default_duration_days)
            });
            let loan = service.create(
                actor,
                &LoanInput {
                    student_id: student,
                    asset_id: asset,
                    loan_date,
                    expected_return_date,
                    notes,
                },
            )?;
            print_loan(&loan);
        }
        LoanCommand::Return { id, on } => {
            print_loan(&service.register_return(actor, id, on.unwrap_or_else(today))?)
        }
        LoanCommand::Edit {
            id,
            student,
            asset,
            due,
            notes,
        } => {
            let current = service.get(actor, id, false)?;
            let mut edit = LoanEdit::from(&current);
            if let Some(student) = student {
                edit.student_id = student;
            }
            if let Some(asset) = asset {
                edit.asset_id = asset;
            }
            if let Some(due) = due {
                edit.expected_return_date = due;
            }
            if notes.is_some() {
                edit.notes = notes;
            }
            print_loan(&service.edit(actor, id, &edit)?);
        }
        LoanCommand::List {
            state,
            include_deleted,
        } => {
            let query = LoanListQuery {
                include_deleted,
                state: state.map(|state| match state {
                    LoanStateArg::Active => LoanState::Active,
                    LoanStateArg::Finished => LoanState::Finished,
                    LoanStateArg::Canceled => LoanState::Canceled,
                }),
                ..LoanListQuery::default()
            };
            for loan in service.list(actor, &query)? {
                print_loan(&loan);
            }
        }
        LoanCommand::Show {
            id,
            include_deleted,
        } => print_loan(&service.get(actor, id, include_deleted)?),
        LoanCommand::Remove { id } => service.remove(actor, id)?,
        LoanCommand::Restore { id } => print_loan(&service.restore(actor, id)?),
        LoanCommand::Overdue => {
            for loan in service.list_overdue(actor, today())? {
                print_loan(&loan);
            }
        }
        LoanCommand::DueSoon { days } => {
            let days = days.unwrap_or(config.reminders.window_days);
            for loan in service.list_due_soon(actor, today(), days)? {
                print_loan(&loan);
            }
        }
    }
    Ok(())
}

fn run_occurrence_type(
    conn: &Connection,
    actor: &Actor,
    command: OccurrenceTypeCommand,
) -> Result<()> {
    let service = OccurrenceService::new(SqliteOccurrenceRepository::try_new(conn)?);
    match command {
        OccurrenceTypeCommand::Add { name, description } => {
            print_occurrence_type(&service.register_type(actor, &name, description.as_deref())?)
        }
        OccurrenceTypeCommand::Edit {
            id,
            name,
            description,
        } => print_occurrence_type(&service.edit_type(
            actor,
            id,
            &name,
            description.as_deref(),
        )?),
        OccurrenceTypeCommand::List { include_deleted } => {
            for kind in service.list_types(actor, &list_query(include_deleted))? {
                print_occurrence_type(&kind);
            }
        }
        OccurrenceTypeCommand::Remove { id } => service.remove_type(actor, id)?,
        OccurrenceTypeCommand::Restore { id } => {
            print_occurrence_type(&service.restore_type(actor, id)?)
        }
    }
    Ok(())
}

fn run_occurrence(conn: &Connection, actor: &Actor, command: OccurrenceCommand) -> Result<()> {
    let service = OccurrenceService::new(SqliteOccurrenceRepository::try_new(conn)?);
    match command {
        OccurrenceCommand::Add {
            loan,
            occurrence_type,
            date,
            description,
        } => {
            let occurrence = service.register(
                actor,
                &OccurrenceInput {
                    loan_id: loan,
                    occurrence_type_id: occurrence_type,
                    occurrence_date: date.unwrap_or_else(today),
                    description,
                },
            )?;
            print_occurrence(&occurrence);
        }
        OccurrenceCommand::Edit {
            id,
            occurrence_type,
            date,
            description,
        } => {
            let edit = OccurrenceEdit {
                occurrence_type_id: occurrence_type,
                occurrence_date: date,
                description,
            };
            print_occurrence(&service.edit(actor, id, &edit)?);
        }
        OccurrenceCommand::Cancel { id, reason } => {
            print_occurrence(&service.cancel(actor, id, &reason)?)
        }
        OccurrenceCommand::List {
            loan,
            hide_canceled,
        } => {
            let query = OccurrenceListQuery {
                loan_id: loan,
                hide_canceled,
                include_deleted: false,
            };
            for occurrence in service.list(actor, &query)? {
                print_occurrence(&occurrence);
            }
        }
    }
    Ok(())
}

fn list_query(include_deleted: bool) -> ListQuery {
    ListQuery {
        include_deleted,
        ..ListQuery::default()
    }
}

fn student_input(fields: StudentFields) -> StudentInput {
    StudentInput {
        name: fields.name,
        cpf: fields.cpf,
        email: fields.email,
        matricula: fields.matricula,
        phone: fields.phone,
        course_id: fields.course,
        admission_method_id: fields.admission_method,
    }
}

fn asset_input(fields: AssetFields) -> AssetInput {
    AssetInput {
        patrimonio: fields.patrimonio,
        description: fields.description,
        serial_number: fields.serial_number,
        asset_type_id: fields.asset_type,
        fragility_id: fields.fragility,
        condition_id: fields.condition,
        brand_model_id: fields.brand_model,
    }
}

fn deleted_marker(deleted_at: Option<i64>) -> &'static str {
    if deleted_at.is_some() {
        "\t[removed]"
    } else {
        ""
    }
}

fn print_catalog_entry(entry: &CatalogEntry) {
    println!(
        "{}\t{}\t{}{}",
        entry.id,
        entry.kind.as_str(),
        entry.name,
        deleted_marker(entry.audit.deleted_at)
    );
}

fn print_student(student: &Student) {
    println!(
        "{}\t{}\t{}\t{}{}",
        student.id,
        student.matricula,
        student.name,
        student.email,
        deleted_marker(student.audit.deleted_at)
    );
}

fn print_asset(asset: &Asset) {
    println!(
        "{}\t{}\t{}{}",
        asset.id,
        asset.patrimonio,
        asset.description,
        deleted_marker(asset.audit.deleted_at)
    );
}

fn print_loan(loan: &Loan) {
    let returned = loan
        .actual_return_date
        .map(|date| date.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}\t{}\tstudent={}\tasset={}\tloan={}\tdue={}\treturned={}{}",
        loan.id,
        loan.state.as_str(),
        loan.student_id,
        loan.asset_id,
        loan.loan_date,
        loan.expected_return_date,
        returned,
        deleted_marker(loan.audit.deleted_at)
    );
}

fn print_occurrence_type(kind: &OccurrenceType) {
    println!(
        "{}\t{}{}",
        kind.id,
        kind.name,
        deleted_marker(kind.audit.deleted_at)
    );
}

fn print_occurrence(occurrence: &Occurrence) {
    let status = if occurrence.is_canceled() {
        "canceled"
    } else {
        "open"
    };
    println!(
        "{}\t{}\tloan={}\t{}\t{}",
        occurrence.id,
        status,
        occurrence.loan_id,
        occurrence.occurrence_date,
        occurrence.description
    );
}
