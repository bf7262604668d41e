//! Per-resource permission predicates keyed on the acting user.
//!
//! # Responsibility
//! - Describe who is acting (`Actor`) and what they may do (`Policy`).
//! - Ship the default role grant table (`RolePolicy`).
//!
//! # Invariants
//! - Deny by default: an action is allowed only when a role grants it.
//! - Inactive actors hold no grants.

use crate::model::user::{Role, User, UserId};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Authenticated caller identity passed into every use-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub roles: BTreeSet<Role>,
    pub active: bool,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>, roles: BTreeSet<Role>) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles,
            active: true,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.active && self.roles.contains(&role)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            roles: user.roles.clone(),
            active: user.active,
        }
    }
}

/// Guarded entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Catalog,
    Student,
    Asset,
    Loan,
    OccurrenceType,
    Occurrence,
    User,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Student => "student",
            Self::Asset => "asset",
            Self::Loan => "loan",
            Self::OccurrenceType => "occurrence_type",
            Self::Occurrence => "occurrence",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    List,
    Create,
    Edit,
    Remove,
    View,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Remove => "remove",
            Self::View => "view",
        }
    }
}

/// Denied authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenied {
    pub username: String,
    pub resource: Resource,
    pub action: Action,
}

impl Display for PermissionDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user `{}` is not allowed to {} {}",
            self.username,
            self.action.as_str(),
            self.resource.as_str()
        )
    }
}

impl Error for PermissionDenied {}

/// Permission predicates for one resource.
pub trait Policy {
    fn resource(&self) -> Resource;
    fn allows(&self, actor: &Actor, action: Action) -> bool;

    fn can_list(&self, actor: &Actor) -> bool {
        self.allows(actor, Action::List)
    }

    fn can_create(&self, actor: &Actor) -> bool {
        self.allows(actor, Action::Create)
    }

    fn can_edit(&self, actor: &Actor) -> bool {
        self.allows(actor, Action::Edit)
    }

    fn can_remove(&self, actor: &Actor) -> bool {
        self.allows(actor, Action::Remove)
    }

    fn can_view(&self, actor: &Actor) -> bool {
        self.allows(actor, Action::View)
    }

    /// Returns `PermissionDenied` unless `actor` may perform `action`.
    fn authorize(&self, actor: &Actor, action: Action) -> Result<(), PermissionDenied> {
        if self.allows(actor, action) {
            return Ok(());
        }
        Err(PermissionDenied {
            username: actor.username.clone(),
            resource: self.resource(),
            action,
        })
    }
}

/// Default role-based policy for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePolicy {
    resource: Resource,
}

impl RolePolicy {
    pub fn for_resource(resource: Resource) -> Self {
        Self { resource }
    }
}

impl Policy for RolePolicy {
    fn resource(&self) -> Resource {
        self.resource
    }

    fn allows(&self, actor: &Actor, action: Action) -> bool {
        actor.active
            && actor
                .roles
                .iter()
                .any(|role| role_grants(*role, self.resource, action))
    }
}

/// Default grant table.
///
/// - `administrator`: everything.
/// - `operator`: list/create/edit/view outside user management, plus remove
///   on loans and occurrences.
/// - `auditor`: list/view outside user management.
pub fn role_grants(role: Role, resource: Resource, action: Action) -> bool {
    match role {
        Role::Administrator => true,
        Role::Operator => match (resource, action) {
            (Resource::User, _) => false,
            (Resource::Loan | Resource::Occurrence, Action::Remove) => true,
            (_, Action::Remove) => false,
            _ => true,
        },
        Role::Auditor => {
            resource != Resource::User && matches!(action, Action::List | Action::View)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, Actor, Policy, Resource, RolePolicy};
    use crate::model::user::Role;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn actor(roles: &[Role]) -> Actor {
        Actor::new(Uuid::new_v4(), "tester", roles.iter().copied().collect())
    }

    #[test]
    fn actor_without_roles_is_denied_everything() {
        let policy = RolePolicy::for_resource(Resource::Loan);
        let nobody = actor(&[]);
        for action in [
            Action::List,
            Action::Create,
            Action::Edit,
            Action::Remove,
            Action::View,
        ] {
            assert!(!policy.allows(&nobody, action));
        }
    }

    #[test]
    fn operator_can_cancel_occurrences_but_not_remove_students() {
        let operator = actor(&[Role::Operator]);
        assert!(RolePolicy::for_resource(Resource::Occurrence).can_remove(&operator));
        assert!(RolePolicy::for_resource(Resource::Loan).can_remove(&operator));
        assert!(!RolePolicy::for_resource(Resource::Student).can_remove(&operator));
        assert!(RolePolicy::for_resource(Resource::Student).can_create(&operator));
        assert!(!RolePolicy::for_resource(Resource::User).can_list(&operator));
    }

    #[test]
    fn auditor_is_read_only() {
        let auditor = actor(&[Role::Auditor]);
        let policy = RolePolicy::for_resource(Resource::Asset);
        assert!(policy.can_list(&auditor));
        assert!(policy.can_view(&auditor));
        assert!(!policy.can_create(&auditor));
        assert!(!policy.can_edit(&auditor));
    }

    #[test]
    fn inactive_administrator_holds_no_grants() {
        let mut admin = actor(&[Role::Administrator]);
        admin.active = false;
        let err = RolePolicy::for_resource(Resource::Loan)
            .authorize(&admin, Action::List)
            .expect_err("inactive actor must be denied");
        assert_eq!(err.action, Action::List);
        assert!(err.to_string().contains("not allowed to list loan"));
    }

    #[test]
    fn roles_union_their_grants() {
        let both = Actor::new(
            Uuid::new_v4(),
            "both",
            BTreeSet::from([Role::Auditor, Role::Operator]),
        );
        assert!(RolePolicy::for_resource(Resource::Loan).can_create(&both));
    }
}
