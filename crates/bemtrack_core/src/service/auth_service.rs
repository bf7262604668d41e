//! Account authentication and user management.
//!
//! # Responsibility
//! - Turn a username/password pair into an [`Actor`].
//! - Register users, including the bootstrap administrator.
//!
//! # Invariants
//! - The first user of an empty database is always an administrator and
//!   needs no acting user.
//! - Inactive accounts never authenticate.
//! - Passwords and salts are never logged.

use crate::model::user::{Role, User, UserId};
use crate::model::validation::{normalize_email, require_text, ValidationError};
use crate::model::EntityKind;
use crate::policy::{Action, Actor, PermissionDenied, Policy, Resource, RolePolicy};
use crate::repo::user_repo::UserRepository;
use crate::service::{observe, UseCaseError, UseCaseResult};
use log::{info, warn};
use std::collections::BTreeSet;

/// Account fields supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub roles: BTreeSet<Role>,
}

pub struct AuthService<R: UserRepository, P: Policy = RolePolicy> {
    repo: R,
    policy: P,
}

impl<R: UserRepository> AuthService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, RolePolicy::for_resource(Resource::User))
    }
}

impl<R: UserRepository, P: Policy> AuthService<R, P> {
    pub fn with_policy(repo: R, policy: P) -> Self {
        Self { repo, policy }
    }

    /// Returns the acting identity for valid credentials, `None` otherwise.
    pub fn authenticate(&self, username: &str, password: &str) -> UseCaseResult<Option<Actor>> {
        let user = self.repo.find_user_by_username(username)?;
        let actor = user
            .filter(|user| user.active && user.verify_password(password))
            .map(|user| Actor::from(&user));

        if actor.is_some() {
            info!("event=auth_login module=auth status=ok");
        } else {
            warn!("event=auth_login module=auth status=rejected");
        }
        Ok(actor)
    }

    /// Whether the database has no accounts yet.
    pub fn needs_bootstrap(&self) -> UseCaseResult<bool> {
        Ok(self.repo.count_users()? == 0)
    }

    /// Registers an account.
    ///
    /// With no users stored, `actor` may be `None` and the account is created
    /// as an administrator whatever roles were asked for. Otherwise the
    /// actor needs `create` on users.
    pub fn register_user(&self, actor: Option<&Actor>, new_user: &NewUser) -> UseCaseResult<User> {
        observe("user_register", "auth", || {
            let bootstrap = self.repo.count_users()? == 0;
            let (created_by, roles) = if bootstrap {
                (None, BTreeSet::from([Role::Administrator]))
            } else {
                let actor = actor.ok_or_else(|| PermissionDenied {
                    username: "anonymous".to_string(),
                    resource: Resource::User,
                    action: Action::Create,
                })?;
                self.policy.authorize(actor, Action::Create)?;
                if new_user.roles.is_empty() {
                    return Err(ValidationError::Blank { field: "roles" }.into());
                }
                (Some(actor.user_id), new_user.roles.clone())
            };

            let username = require_text("username", &new_user.username)?;
            let email = normalize_email(&new_user.email)?;
            if new_user.password.trim().is_empty() {
                return Err(ValidationError::Blank { field: "password" }.into());
            }
            if self.repo.find_user_by_username(&username)?.is_some() {
                return Err(UseCaseError::Duplicate {
                    entity: EntityKind::User,
                    field: "username".to_string(),
                });
            }

            let user = User::new(username, email, &new_user.password, roles, created_by);
            let id = self.repo.create_user(&user)?;
            self.fetch(id)
        })
    }

    /// Enables or disables an account. An actor cannot disable itself.
    pub fn set_active(&self, actor: &Actor, id: UserId, active: bool) -> UseCaseResult<User> {
        observe("user_set_active", "auth", || {
            let mut user = self.fetch(id)?;
            self.policy.authorize(actor, Action::Edit)?;
            if !active && user.id == actor.user_id {
                return Err(PermissionDenied {
                    username: actor.username.clone(),
                    resource: Resource::User,
                    action: Action::Edit,
                }
                .into());
            }

            user.active = active;
            user.audit.touch(actor.user_id);
            self.repo.update_user(&user)?;
            self.fetch(id)
        })
    }

    /// Replaces a password. Users may always change their own.
    pub fn change_password(
        &self,
        actor: &Actor,
        id: UserId,
        new_password: &str,
    ) -> UseCaseResult<()> {
        observe("user_change_password", "auth", || {
            let mut user = self.fetch(id)?;
            if user.id != actor.user_id {
                self.policy.authorize(actor, Action::Edit)?;
            }
            if new_password.trim().is_empty() {
                return Err(ValidationError::Blank { field: "password" }.into());
            }

            user.set_password(new_password);
            user.audit.touch(actor.user_id);
            self.repo.update_user(&user)?;
            Ok(())
        })
    }

    fn fetch(&self, id: UserId) -> UseCaseResult<User> {
        self.repo
            .get_user(id)?
            .ok_or_else(|| UseCaseError::not_found(EntityKind::User, id))
    }
}
