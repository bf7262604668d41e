mod common;

use bemtrack_core::model::catalog::CatalogKind;
use bemtrack_core::model::validation::ValidationError;
use bemtrack_core::repo::asset_repo::SqliteAssetRepository;
use bemtrack_core::repo::catalog_repo::SqliteCatalogRepository;
use bemtrack_core::repo::student_repo::SqliteStudentRepository;
use bemtrack_core::service::asset_service::AssetService;
use bemtrack_core::service::catalog_service::CatalogService;
use bemtrack_core::service::student_service::StudentService;
use bemtrack_core::{open_db_in_memory, EntityKind, ListQuery, StateViolation, UseCaseError};
use common::{
    asset_input, bootstrap_admin, day, open_loan, register_asset, register_student, seed_catalog,
    student_input,
};
use uuid::Uuid;

fn duplicate_field(err: UseCaseError) -> String {
    match err {
        UseCaseError::Duplicate { field, .. } => field,
        other => panic!("expected duplicate error, got {other}"),
    }
}

#[test]
fn student_registration_normalizes_and_enforces_unique_keys() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let service = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());

    let mut input = student_input(&catalog, 0);
    input.email = "  Student0@Escola.EDU.br ".to_string();
    let student = service.register(&admin, &input).unwrap();
    assert_eq!(student.cpf, "52998224725");
    assert_eq!(student.email, "student0@escola.edu.br");

    let mut same_cpf = student_input(&catalog, 1);
    same_cpf.cpf = "52998224725".to_string();
    assert_eq!(
        duplicate_field(service.register(&admin, &same_cpf).unwrap_err()),
        "cpf"
    );

    let mut same_email = student_input(&catalog, 1);
    same_email.email = "STUDENT0@escola.edu.br".to_string();
    assert_eq!(
        duplicate_field(service.register(&admin, &same_email).unwrap_err()),
        "email"
    );

    let mut same_matricula = student_input(&catalog, 1);
    same_matricula.matricula = student.matricula.clone();
    assert_eq!(
        duplicate_field(service.register(&admin, &same_matricula).unwrap_err()),
        "matricula"
    );
}

#[test]
fn student_rejects_invalid_cpf_and_wrong_catalog_references() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let service = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());

    let mut bad_cpf = student_input(&catalog, 0);
    bad_cpf.cpf = "529.982.247-26".to_string();
    assert!(matches!(
        service.register(&admin, &bad_cpf).unwrap_err(),
        UseCaseError::Validation(ValidationError::InvalidCpf)
    ));

    let mut campus_as_course = student_input(&catalog, 0);
    campus_as_course.course_id = catalog.campus;
    assert!(matches!(
        service.register(&admin, &campus_as_course).unwrap_err(),
        UseCaseError::Validation(ValidationError::WrongCatalogKind {
            field: "course_id",
            ..
        })
    ));

    let mut missing_course = student_input(&catalog, 0);
    missing_course.course_id = Uuid::new_v4();
    assert!(matches!(
        service.register(&admin, &missing_course).unwrap_err(),
        UseCaseError::NotFound {
            entity: EntityKind::CatalogEntry,
            ..
        }
    ));
}

#[test]
fn student_edit_keeps_own_keys_but_rejects_foreign_ones() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let first = register_student(&conn, &admin, &catalog, 0);
    let second = register_student(&conn, &admin, &catalog, 1);
    let service = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());

    let mut rename = student_input(&catalog, 0);
    rename.name = "Ana Souza".to_string();
    rename.phone = Some(" 11 99999-0000 ".to_string());
    let edited = service.edit(&admin, first.id, &rename).unwrap();
    assert_eq!(edited.name, "Ana Souza");
    assert_eq!(edited.phone.as_deref(), Some("11 99999-0000"));
    assert_eq!(edited.audit.updated_by, Some(admin.user_id));

    let mut steal = student_input(&catalog, 0);
    steal.matricula = second.matricula.clone();
    assert_eq!(
        duplicate_field(service.edit(&admin, first.id, &steal).unwrap_err()),
        "matricula"
    );
}

#[test]
fn soft_deleted_student_is_hidden_but_still_reserves_its_keys() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let student = register_student(&conn, &admin, &catalog, 0);
    let service = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());

    service.remove(&admin, student.id).unwrap();
    assert!(service.list(&admin, &ListQuery::default()).unwrap().is_empty());
    let all = service.list(&admin, &ListQuery::including_deleted()).unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].audit.is_deleted());

    assert!(matches!(
        service.get(&admin, student.id, false).unwrap_err(),
        UseCaseError::NotFound { .. }
    ));
    assert!(service.get(&admin, student.id, true).is_ok());

    assert_eq!(
        duplicate_field(
            service
                .register(&admin, &student_input(&catalog, 0))
                .unwrap_err()
        ),
        "cpf"
    );

    let restored = service.restore(&admin, student.id).unwrap();
    assert!(!restored.audit.is_deleted());
    assert_eq!(service.list(&admin, &ListQuery::default()).unwrap().len(), 1);
}

#[test]
fn parties_of_an_active_loan_cannot_be_removed() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let student = register_student(&conn, &admin, &catalog, 0);
    let asset = register_asset(&conn, &admin, &catalog, "PAT-001");
    open_loan(&conn, &admin, &student, &asset, day(2024, 3, 1), day(2024, 3, 8));

    let students = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());
    assert!(matches!(
        students.remove(&admin, student.id).unwrap_err(),
        UseCaseError::InvalidState(StateViolation::InActiveLoan(EntityKind::Student))
    ));

    let assets = AssetService::new(SqliteAssetRepository::try_new(&conn).unwrap());
    let err = assets.remove(&admin, asset.id).unwrap_err();
    assert_eq!(err.to_string(), "asset has an active loan");
}

#[test]
fn assets_are_unique_by_patrimonio_and_listed_in_tag_order() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let service = AssetService::new(SqliteAssetRepository::try_new(&conn).unwrap());

    for tag in ["PAT-003", "PAT-001", "PAT-002"] {
        service.register(&admin, &asset_input(&catalog, tag)).unwrap();
    }
    let err = service
        .register(&admin, &asset_input(&catalog, "  PAT-001 "))
        .unwrap_err();
    assert_eq!(duplicate_field(err), "patrimonio");

    let tags: Vec<String> = service
        .list(&admin, &ListQuery::default())
        .unwrap()
        .into_iter()
        .map(|asset| asset.patrimonio)
        .collect();
    assert_eq!(tags, vec!["PAT-001", "PAT-002", "PAT-003"]);

    let mut wrong_kind = asset_input(&catalog, "PAT-004");
    wrong_kind.condition_id = catalog.fragility;
    assert!(matches!(
        service.register(&admin, &wrong_kind).unwrap_err(),
        UseCaseError::Validation(ValidationError::WrongCatalogKind {
            field: "condition_id",
            ..
        })
    ));
}

#[test]
fn catalog_names_are_unique_per_kind_and_parents_are_checked() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let service = CatalogService::new(SqliteCatalogRepository::try_new(&conn).unwrap());

    let duplicate = service
        .register(&admin, CatalogKind::AssetType, "NOTEBOOK", None)
        .unwrap_err();
    assert_eq!(duplicate_field(duplicate), "name");

    // Same name under another kind is fine.
    service
        .register(&admin, CatalogKind::BrandModel, "Notebook", None)
        .unwrap();

    let unexpected = service
        .register(&admin, CatalogKind::Fragility, "Media", Some(catalog.campus))
        .unwrap_err();
    assert!(matches!(
        unexpected,
        UseCaseError::Validation(ValidationError::UnexpectedParent { .. })
    ));

    let wrong_parent = service
        .register(&admin, CatalogKind::Course, "Redes", Some(catalog.asset_type))
        .unwrap_err();
    assert!(matches!(
        wrong_parent,
        UseCaseError::Validation(ValidationError::WrongCatalogKind {
            field: "parent_id",
            ..
        })
    ));

    let courses = service
        .list(&admin, Some(CatalogKind::Course), &ListQuery::default())
        .unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0].parent_id, Some(catalog.campus));
    assert_eq!(service.get(&admin, catalog.course, false).unwrap().name, "Informatica");
}
