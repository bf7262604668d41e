//! Audit metadata shared by every persisted record.
//!
//! # Invariants
//! - `created_at <= updated_at`.
//! - `deleted_at` is the single source of truth for tombstone state.

use crate::model::user::UserId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall clock as Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Who created/changed a record and when, plus its soft-delete tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: i64,
    /// `None` only for records created by bootstrap paths.
    pub created_by: Option<UserId>,
    pub updated_at: i64,
    pub updated_by: Option<UserId>,
    pub deleted_at: Option<i64>,
}

impl AuditStamp {
    /// Stamps a fresh record.
    pub fn new(actor: Option<UserId>) -> Self {
        let now = now_epoch_ms();
        Self {
            created_at: now,
            created_by: actor,
            updated_at: now,
            updated_by: actor,
            deleted_at: None,
        }
    }

    /// Records a mutation by `actor`.
    pub fn touch(&mut self, actor: UserId) {
        self.updated_at = now_epoch_ms().max(self.created_at);
        self.updated_by = Some(actor);
    }

    /// Marks the owning record as softly deleted.
    ///
    /// Re-deleting keeps the first tombstone timestamp.
    pub fn soft_delete(&mut self, actor: UserId) {
        self.touch(actor);
        if self.deleted_at.is_none() {
            self.deleted_at = Some(self.updated_at);
        }
    }

    /// Clears the tombstone.
    pub fn restore(&mut self, actor: UserId) {
        self.touch(actor);
        self.deleted_at = None;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::AuditStamp;
    use uuid::Uuid;

    #[test]
    fn soft_delete_keeps_first_tombstone_and_restore_clears_it() {
        let actor = Uuid::new_v4();
        let mut audit = AuditStamp::new(Some(actor));
        assert!(!audit.is_deleted());

        audit.soft_delete(actor);
        let first = audit.deleted_at.expect("tombstone should be set");
        audit.soft_delete(actor);
        assert_eq!(audit.deleted_at, Some(first));

        audit.restore(actor);
        assert!(!audit.is_deleted());
        assert!(audit.updated_at >= audit.created_at);
    }
}
