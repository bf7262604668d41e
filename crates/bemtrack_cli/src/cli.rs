use bemtrack_core::model::catalog::CatalogKind;
use bemtrack_core::model::user::Role;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

/// bemtrack - asset and loan desk for educational institutions
#[derive(Parser, Debug)]
#[command(name = "bemtrack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $BEMTRACK_CONFIG, then ./bemtrack.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Acting username
    #[arg(short, long, global = true, env = "BEMTRACK_USER")]
    pub user: Option<String>,

    /// Acting user's password
    #[arg(long, global = true, env = "BEMTRACK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and its first administrator
    Init {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "BEMTRACK_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },

    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Reference tables (campus, course, asset type, ...)
    #[command(subcommand)]
    Catalog(CatalogCommand),

    #[command(subcommand)]
    Student(StudentCommand),

    #[command(subcommand)]
    Asset(AssetCommand),

    #[command(subcommand)]
    Loan(LoanCommand),

    #[command(subcommand)]
    OccurrenceType(OccurrenceTypeCommand),

    #[command(subcommand)]
    Occurrence(OccurrenceCommand),

    /// Print a responsibility or return term for a loan
    Term {
        #[arg(value_enum)]
        kind: TermKindArg,
        loan_id: Uuid,
        /// Write the term to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mail students whose loans fall due soon
    Remind {
        /// Reference date (defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Add {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "BEMTRACK_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
        #[arg(long, value_enum, value_delimiter = ',', required = true)]
        roles: Vec<RoleArg>,
    },
    Disable { id: Uuid },
    Enable { id: Uuid },
    Password {
        id: Uuid,
        #[arg(long, env = "BEMTRACK_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    Add {
        #[arg(long, value_parser = parse_catalog_kind)]
        kind: CatalogKind,
        name: String,
        /// Campus of a course
        #[arg(long)]
        parent: Option<Uuid>,
    },
    List {
        #[arg(long, value_parser = parse_catalog_kind)]
        kind: Option<CatalogKind>,
        #[arg(long)]
        include_deleted: bool,
    },
    Show { id: Uuid },
}

#[derive(Args, Debug)]
pub struct StudentFields {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub cpf: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub matricula: String,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub course: Uuid,
    #[arg(long)]
    pub admission_method: Uuid,
}

#[derive(Subcommand, Debug)]
pub enum StudentCommand {
    Add(StudentFields),
    Edit {
        id: Uuid,
        #[command(flatten)]
        fields: StudentFields,
    },
    List {
        #[arg(long)]
        include_deleted: bool,
    },
    Show {
        id: Uuid,
        #[arg(long)]
        include_deleted: bool,
    },
    Remove { id: Uuid },
    Restore { id: Uuid },
}

#[derive(Args, Debug)]
pub struct AssetFields {
    #[arg(long)]
    pub patrimonio: String,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub serial_number: Option<String>,
    #[arg(long)]
    pub asset_type: Uuid,
    #[arg(long)]
    pub fragility: Uuid,
    #[arg(long)]
    pub condition: Uuid,
    #[arg(long)]
    pub brand_model: Uuid,
}

#[derive(Subcommand, Debug)]
pub enum AssetCommand {
    Add(AssetFields),
    Edit {
        id: Uuid,
        #[command(flatten)]
        fields: AssetFields,
    },
    List {
        #[arg(long)]
        include_deleted: bool,
    },
    Show {
        id: Uuid,
        #[arg(long)]
        include_deleted: bool,
    },
    Remove { id: Uuid },
    Restore { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum LoanCommand {
    /// Open a loan
    Open {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        asset: Uuid,
        /// Defaults to today
        #[arg(long)]
        loan_date: Option<NaiveDate>,
        /// Defaults to loan date plus `[loans] default_duration_days`
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Register the return of a loan
    Return {
        id: Uuid,
        /// Defaults to today
        #[arg(long)]
        on: Option<NaiveDate>,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        student: Option<Uuid>,
        #[arg(long)]
        asset: Option<Uuid>,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(long, value_enum)]
        state: Option<LoanStateArg>,
        #[arg(long)]
        include_deleted: bool,
    },
    Show {
        id: Uuid,
        #[arg(long)]
        include_deleted: bool,
    },
    Remove { id: Uuid },
    Restore { id: Uuid },
    /// Active loans past their expected return date
    Overdue,
    /// Active loans due within the reminder window
    DueSoon {
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum OccurrenceTypeCommand {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Edit {
        id: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        #[arg(long)]
        include_deleted: bool,
    },
    Remove { id: Uuid },
    Restore { id: Uuid },
}

#[derive(Subcommand, Debug)]
pub enum OccurrenceCommand {
    Add {
        #[arg(long)]
        loan: Uuid,
        #[arg(long = "type")]
        occurrence_type: Uuid,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        description: String,
    },
    Edit {
        id: Uuid,
        #[arg(long = "type")]
        occurrence_type: Uuid,
        #[arg(long)]
        date: NaiveDate,
        description: String,
    },
    Cancel {
        id: Uuid,
        #[arg(long)]
        reason: String,
    },
    List {
        #[arg(long)]
        loan: Option<Uuid>,
        #[arg(long)]
        hide_canceled: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermKindArg {
    Responsibility,
    Return,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanStateArg {
    Active,
    Finished,
    Canceled,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Administrator,
    Operator,
    Auditor,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Administrator => Role::Administrator,
            RoleArg::Operator => Role::Operator,
            RoleArg::Auditor => Role::Auditor,
        }
    }
}

fn parse_catalog_kind(value: &str) -> Result<CatalogKind, String> {
    CatalogKind::parse(value).ok_or_else(|| {
        let known: Vec<&str> = CatalogKind::ALL.iter().map(|kind| kind.as_str()).collect();
        format!("unknown catalog kind `{value}`; expected one of {}", known.join("|"))
    })
}
