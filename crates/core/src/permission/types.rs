//! Role and subject types for the permission model.

use std::collections::BTreeSet;

use keyhold_shared::types::UserId;
use serde::{Deserialize, Serialize};

/// Well-known permission strings used by the approval workflow.
pub mod perms {
    /// Record an approve or reject decision.
    pub const APPROVALS_APPROVE: &str = "approvals:approve";
}

/// A named role in the authority hierarchy.
///
/// Lower `level` values carry more authority. Owner roles are exempt
/// from every permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name, unique within a catalog.
    pub name: String,
    /// Authority level (lower = more authority).
    pub level: i32,
    /// Fine-grained `module:action` permissions.
    pub permissions: BTreeSet<String>,
    /// Whether holders of this role bypass all checks.
    pub is_owner_role: bool,
}

/// The identity of a caller, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// The authenticated user.
    pub user_id: UserId,
    /// Authority level of the user's role.
    pub role_level: i32,
    /// Effective permissions.
    pub permissions: BTreeSet<String>,
    /// Whether the user holds an owner role.
    pub is_owner: bool,
}

impl Subject {
    /// Creates a non-owner subject with the given permissions.
    pub fn new<I, S>(user_id: UserId, role_level: i32, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id,
            role_level,
            permissions: permissions.into_iter().map(Into::into).collect(),
            is_owner: false,
        }
    }

    /// Creates an owner subject. Owners sit at level 0.
    #[must_use]
    pub fn owner(user_id: UserId) -> Self {
        Self {
            user_id,
            role_level: 0,
            permissions: BTreeSet::new(),
            is_owner: true,
        }
    }

    /// Creates a subject holding the given role.
    #[must_use]
    pub fn from_role(user_id: UserId, role: &Role) -> Self {
        Self {
            user_id,
            role_level: role.level,
            permissions: role.permissions.clone(),
            is_owner: role.is_owner_role,
        }
    }
}
