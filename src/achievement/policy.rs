//! Access policy for achievement references
//!
//! Pure functions over the principal, the reference, and the owning student's
//! advisor. Admins read everything and mutate nothing.

use crate::auth::{Principal, Role};

use super::error::AchievementError;
use super::model::{AchievementReference, AchievementStatus};

/// Operations gated by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Update,
    Submit,
    Delete,
    AttachFiles,
    Verify,
    Reject,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Submit => "submit",
            Operation::Delete => "delete",
            Operation::AttachFiles => "attach files to",
            Operation::Verify => "verify",
            Operation::Reject => "reject",
        }
    }

    fn is_advisor_review(&self) -> bool {
        matches!(self, Operation::Verify | Operation::Reject)
    }
}

/// Policy outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// The caller may not know the reference exists
    Hidden,
    /// The caller can see the reference but may not do this
    Deny,
}

impl Decision {
    pub fn into_result(self) -> Result<(), AchievementError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Hidden => Err(AchievementError::NotFound),
            Decision::Deny => Err(AchievementError::Forbidden),
        }
    }
}

fn is_owner(principal: &Principal, reference: &AchievementReference) -> bool {
    principal.role == Role::Student && reference.student_id == principal.id
}

fn is_assigned_advisor(principal: &Principal, advisor_id: Option<&str>) -> bool {
    principal.role == Role::Advisor && advisor_id == Some(principal.id.as_str())
}

/// May `principal` see `reference` at all?
pub fn can_read(
    principal: &Principal,
    reference: &AchievementReference,
    advisor_id: Option<&str>,
) -> bool {
    match principal.role {
        Role::Admin => true,
        _ if reference.status == AchievementStatus::Deleted => false,
        Role::Student => is_owner(principal, reference),
        Role::Advisor => is_assigned_advisor(principal, advisor_id),
    }
}

/// Full decision for an operation.
///
/// Verify and reject are checked against the advisor assignment before
/// visibility, so a non-assigned advisor gets `Deny` rather than `Hidden`.
pub fn decide(
    principal: &Principal,
    reference: &AchievementReference,
    advisor_id: Option<&str>,
    operation: Operation,
) -> Decision {
    if operation.is_advisor_review() {
        if !is_assigned_advisor(principal, advisor_id) {
            return Decision::Deny;
        }
        if reference.status == AchievementStatus::Deleted {
            return Decision::Hidden;
        }
        return Decision::Allow;
    }

    if !can_read(principal, reference, advisor_id) {
        return Decision::Hidden;
    }

    match operation {
        Operation::Read => Decision::Allow,
        _ if is_owner(principal, reference) => Decision::Allow,
        _ => Decision::Deny,
    }
}

/// May `principal` perform a mutating `operation` on `reference`?
pub fn can_mutate(
    principal: &Principal,
    reference: &AchievementReference,
    advisor_id: Option<&str>,
    operation: Operation,
) -> bool {
    operation != Operation::Read
        && decide(principal, reference, advisor_id, operation) == Decision::Allow
}

/// Only students create achievements, always for themselves.
pub fn can_create(principal: &Principal) -> bool {
    principal.role == Role::Student
}
