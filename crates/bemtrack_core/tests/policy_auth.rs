mod common;

use bemtrack_core::model::loan::LoanInput;
use bemtrack_core::model::user::Role;
use bemtrack_core::repo::loan_repo::{LoanListQuery, SqliteLoanRepository};
use bemtrack_core::repo::student_repo::SqliteStudentRepository;
use bemtrack_core::repo::user_repo::SqliteUserRepository;
use bemtrack_core::service::auth_service::{AuthService, NewUser};
use bemtrack_core::service::loan_service::LoanService;
use bemtrack_core::service::student_service::StudentService;
use bemtrack_core::{
    open_db_in_memory, Action, Actor, EntityKind, ListQuery, Policy, Resource, UseCaseError,
};
use common::{
    bootstrap_admin, day, loans, register_asset, register_student, seed_catalog, user_with_roles,
};
use rusqlite::Connection;
use std::collections::BTreeSet;

fn auth(conn: &Connection) -> AuthService<SqliteUserRepository<'_>> {
    AuthService::new(SqliteUserRepository::try_new(conn).unwrap())
}

fn new_user(username: &str, roles: &[Role]) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: format!("{username}@escola.edu.br"),
        password: "s3cret".to_string(),
        roles: roles.iter().copied().collect(),
    }
}

#[test]
fn first_user_bootstraps_as_administrator() {
    let conn = open_db_in_memory().unwrap();
    let service = auth(&conn);
    assert!(service.needs_bootstrap().unwrap());

    let admin = service
        .register_user(None, &new_user("root", &[Role::Auditor]))
        .unwrap();
    assert_eq!(admin.roles, BTreeSet::from([Role::Administrator]));
    assert_eq!(admin.audit.created_by, None);
    assert!(!service.needs_bootstrap().unwrap());

    let anonymous = service
        .register_user(None, &new_user("intruder", &[Role::Administrator]))
        .unwrap_err();
    assert!(matches!(anonymous, UseCaseError::PermissionDenied(_)));
}

#[test]
fn only_administrators_manage_users() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let operator = user_with_roles(&conn, &admin, "desk", &[Role::Operator]);
    let service = auth(&conn);

    let denied = service
        .register_user(Some(&operator), &new_user("other", &[Role::Operator]))
        .unwrap_err();
    assert_eq!(
        denied.to_string(),
        "user `desk` is not allowed to create user"
    );

    let duplicate = service
        .register_user(Some(&admin), &new_user("DESK", &[Role::Auditor]))
        .unwrap_err();
    assert!(matches!(
        duplicate,
        UseCaseError::Duplicate {
            entity: EntityKind::User,
            ..
        }
    ));

    let no_roles = service
        .register_user(Some(&admin), &new_user("empty", &[]))
        .unwrap_err();
    assert!(matches!(no_roles, UseCaseError::Validation(_)));
}

#[test]
fn authenticate_checks_password_and_active_flag() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let operator = user_with_roles(&conn, &admin, "desk", &[Role::Operator]);
    let service = auth(&conn);

    let actor = service.authenticate("Desk", "desk-secret").unwrap().unwrap();
    assert_eq!(actor.user_id, operator.user_id);
    assert!(actor.has_role(Role::Operator));

    assert!(service.authenticate("desk", "wrong").unwrap().is_none());
    assert!(service.authenticate("nobody", "desk-secret").unwrap().is_none());

    service.set_active(&admin, operator.user_id, false).unwrap();
    assert!(service.authenticate("desk", "desk-secret").unwrap().is_none());

    let self_disable = service
        .set_active(&admin, admin.user_id, false)
        .unwrap_err();
    assert!(matches!(self_disable, UseCaseError::PermissionDenied(_)));
}

#[test]
fn users_can_change_their_own_password() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let auditor = user_with_roles(&conn, &admin, "audit", &[Role::Auditor]);
    let service = auth(&conn);

    service
        .change_password(&auditor, auditor.user_id, "rotated")
        .unwrap();
    assert!(service.authenticate("audit", "audit-secret").unwrap().is_none());
    assert!(service.authenticate("audit", "rotated").unwrap().is_some());

    let foreign = service
        .change_password(&auditor, admin.user_id, "taken-over")
        .unwrap_err();
    assert!(matches!(foreign, UseCaseError::PermissionDenied(_)));
}

#[test]
fn auditor_reads_but_cannot_write() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let auditor = user_with_roles(&conn, &admin, "audit", &[Role::Auditor]);
    let student = register_student(&conn, &admin, &catalog, 0);
    let asset = register_asset(&conn, &admin, &catalog, "PAT-001");

    let denied = loans(&conn)
        .create(
            &auditor,
            &LoanInput {
                student_id: student.id,
                asset_id: asset.id,
                loan_date: day(2024, 3, 1),
                expected_return_date: day(2024, 3, 8),
                notes: None,
            },
        )
        .unwrap_err();
    assert_eq!(denied.to_string(), "user `audit` is not allowed to create loan");
    assert!(loans(&conn)
        .list(&auditor, &LoanListQuery::default())
        .unwrap()
        .is_empty());

    let students = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());
    assert_eq!(students.list(&auditor, &ListQuery::default()).unwrap().len(), 1);
    assert!(matches!(
        students.remove(&auditor, student.id).unwrap_err(),
        UseCaseError::PermissionDenied(_)
    ));
}

#[test]
fn operator_cannot_remove_students() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let catalog = seed_catalog(&conn, &admin);
    let operator = user_with_roles(&conn, &admin, "desk", &[Role::Operator]);
    let student = register_student(&conn, &operator, &catalog, 0);

    let students = StudentService::new(SqliteStudentRepository::try_new(&conn).unwrap());
    assert!(matches!(
        students.remove(&operator, student.id).unwrap_err(),
        UseCaseError::PermissionDenied(_)
    ));
    students.remove(&admin, student.id).unwrap();
}

/// Lets everyone list, nothing else.
struct ListOnly;

impl Policy for ListOnly {
    fn resource(&self) -> Resource {
        Resource::Loan
    }

    fn allows(&self, _actor: &Actor, action: Action) -> bool {
        action == Action::List
    }
}

#[test]
fn services_accept_custom_policies() {
    let conn = open_db_in_memory().unwrap();
    let admin = bootstrap_admin(&conn);
    let service = LoanService::with_policy(SqliteLoanRepository::try_new(&conn).unwrap(), ListOnly);

    assert!(service.list(&admin, &LoanListQuery::default()).is_ok());
    assert!(matches!(
        service.list_overdue(&admin, day(2024, 3, 1)),
        Ok(found) if found.is_empty()
    ));
    let err = service
        .register_return(&admin, uuid::Uuid::new_v4(), day(2024, 3, 1))
        .unwrap_err();
    assert!(matches!(
        err,
        UseCaseError::NotFound {
            entity: EntityKind::Loan,
            ..
        }
    ));
}
