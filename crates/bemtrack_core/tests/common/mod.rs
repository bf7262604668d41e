#![allow(dead_code)]

use bemtrack_core::model::asset::{Asset, AssetInput};
use bemtrack_core::model::catalog::{CatalogId, CatalogKind};
use bemtrack_core::model::loan::{Loan, LoanInput};
use bemtrack_core::model::student::{Student, StudentInput};
use bemtrack_core::model::user::Role;
use bemtrack_core::repo::asset_repo::SqliteAssetRepository;
use bemtrack_core::repo::catalog_repo::SqliteCatalogRepository;
use bemtrack_core::repo::loan_repo::SqliteLoanRepository;
use bemtrack_core::repo::student_repo::SqliteStudentRepository;
use bemtrack_core::repo::user_repo::SqliteUserRepository;
use bemtrack_core::service::asset_service::AssetService;
use bemtrack_core::service::auth_service::{AuthService, NewUser};
use bemtrack_core::service::catalog_service::CatalogService;
use bemtrack_core::service::loan_service::LoanService;
use bemtrack_core::service::student_service::StudentService;
use bemtrack_core::Actor;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::BTreeSet;

pub const CPFS: [&str; 6] = [
    "529.982.247-25",
    "111.444.777-35",
    "123.456.789-09",
    "987.654.321-00",
    "390.533.447-05",
    "746.971.314-01",
];

pub struct Catalog {
    pub campus: CatalogId,
    pub course: CatalogId,
    pub admission_method: CatalogId,
    pub asset_type: CatalogId,
    pub fragility: CatalogId,
    pub condition: CatalogId,
    pub brand_model: CatalogId,
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Creates the bootstrap administrator and returns it as an actor.
pub fn bootstrap_admin(conn: &Connection) -> Actor {
    let auth = AuthService::new(SqliteUserRepository::try_new(conn).unwrap());
    let admin = auth
        .register_user(
            None,
            &NewUser {
                username: "admin".to_string(),
                email: "admin@escola.edu.br".to_string(),
                password: "admin-secret".to_string(),
                roles: BTreeSet::new(),
            },
        )
        .unwrap();
    Actor::from(&admin)
}

pub fn user_with_roles(
    conn: &Connection,
    admin: &Actor,
    username: &str,
    roles: &[Role],
) -> Actor {
    let auth = AuthService::new(SqliteUserRepository::try_new(conn).unwrap());
    let user = auth
        .register_user(
            Some(admin),
            &NewUser {
                username: username.to_string(),
                email: format!("{username}@escola.edu.br"),
                password: format!("{username}-secret"),
                roles: roles.iter().copied().collect(),
            },
        )
        .unwrap();
    Actor::from(&user)
}

pub fn seed_catalog(conn: &Connection, actor: &Actor) -> Catalog {
    let service = CatalogService::new(SqliteCatalogRepository::try_new(conn).unwrap());
    let add = |kind, name: &str, parent| service.register(actor, kind, name, parent).unwrap().id;

    let campus = add(CatalogKind::Campus, "Campus Centro", None);
    Catalog {
        campus,
        course: add(CatalogKind::Course, "Informatica", Some(campus)),
        admission_method: add(CatalogKind::AdmissionMethod, "Vestibular", None),
        asset_type: add(CatalogKind::AssetType, "Notebook", None),
        fragility: add(CatalogKind::Fragility, "Alta", None),
        condition: add(CatalogKind::Condition, "Novo", None),
        brand_model: add(CatalogKind::BrandModel, "Acme X1", None),
    }
}

pub fn student_input(catalog: &Catalog, index: usize) -> StudentInput {
    StudentInput {
        name: format!("Student {index}"),
        cpf: CPFS[index].to_string(),
        email: format!("student{index}@escola.edu.br"),
        matricula: format!("2024{index:03}"),
        phone: None,
        course_id: catalog.course,
        admission_method_id: catalog.admission_method,
    }
}

pub fn asset_input(catalog: &Catalog, patrimonio: &str) -> AssetInput {
    AssetInput {
        patrimonio: patrimonio.to_string(),
        description: format!("Notebook {patrimonio}"),
        serial_number: None,
        asset_type_id: catalog.asset_type,
        fragility_id: catalog.fragility,
        condition_id: catalog.condition,
        brand_model_id: catalog.brand_model,
    }
}

pub fn register_student(
    conn: &Connection,
    actor: &Actor,
    catalog: &Catalog,
    index: usize,
) -> Student {
    StudentService::new(SqliteStudentRepository::try_new(conn).unwrap())
        .register(actor, &student_input(catalog, index))
        .unwrap()
}

pub fn register_asset(
    conn: &Connection,
    actor: &Actor,
    catalog: &Catalog,
    patrimonio: &str,
) -> Asset {
    AssetService::new(SqliteAssetRepository::try_new(conn).unwrap())
        .register(actor, &asset_input(catalog, patrimonio))
        .unwrap()
}

pub fn loans(conn: &Connection) -> LoanService<SqliteLoanRepository<'_>> {
    LoanService::new(SqliteLoanRepository::try_new(conn).unwrap())
}

pub fn open_loan(
    conn: &Connection,
    actor: &Actor,
    student: &Student,
    asset: &Asset,
    loan_date: NaiveDate,
    due: NaiveDate,
) -> Loan {
    loans(conn)
        .create(
            actor,
            &LoanInput {
                student_id: student.id,
                asset_id: asset.id,
                loan_date,
                expected_return_date: due,
                notes: None,
            },
        )
        .unwrap()
}
