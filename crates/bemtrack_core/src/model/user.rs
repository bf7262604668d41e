//! Platform users and their roles.
//!
//! # Invariants
//! - Passwords are never stored in clear; only `sha256(salt || password)`.
//! - An inactive user never authenticates and holds no grants.

use crate::model::audit::AuditStamp;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type UserId = Uuid;

/// Coarse role used by the default policy grant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, including user management.
    Administrator,
    /// Loan desk staff.
    Operator,
    /// Read-only access.
    Auditor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Operator => "operator",
            Self::Auditor => "auditor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "administrator" => Some(Self::Administrator),
            "operator" => Some(Self::Operator),
            "auditor" => Some(Self::Auditor),
            _ => None,
        }
    }
}

/// Stored account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: BTreeSet<Role>,
    pub active: bool,
    pub audit: AuditStamp,
}

impl User {
    /// Creates an active user with a fresh salt and hashed password.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: &str,
        roles: BTreeSet<Role>,
        actor: Option<UserId>,
    ) -> Self {
        let password_salt = Uuid::new_v4().simple().to_string();
        let password_hash = hash_password(&password_salt, password);
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_salt,
            password_hash,
            roles,
            active: true,
            audit: AuditStamp::new(actor),
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(&self.password_salt, password) == self.password_hash
    }

    pub fn set_password(&mut self, password: &str) {
        self.password_salt = Uuid::new_v4().simple().to_string();
        self.password_hash = hash_password(&self.password_salt, password);
    }
}

/// Hex-encoded SHA-256 of `salt` followed by `password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
