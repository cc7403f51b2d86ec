//! Permission checks for role levels, permission strings, and owner bypass.

use keyhold_shared::PermissionsConfig;
use keyhold_shared::types::UserId;

use super::catalog::{self, CapabilityMap, CatalogError, RoleCatalog};
use super::types::Subject;

/// Authorization checks backed by an immutable role catalog.
///
/// Owners pass every check. Everyone else is judged on the permission
/// strings they hold and on their numeric role level, where a lower
/// level carries more authority.
#[derive(Debug, Clone, Default)]
pub struct PermissionModel {
    catalog: RoleCatalog,
    capabilities: CapabilityMap,
}

impl PermissionModel {
    /// Creates a model from pre-built tables.
    #[must_use]
    pub fn new(catalog: RoleCatalog, capabilities: CapabilityMap) -> Self {
        Self {
            catalog,
            capabilities,
        }
    }

    /// Builds a model from the `permissions` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the role catalog or capability table is invalid.
    pub fn from_config(config: &PermissionsConfig) -> Result<Self, CatalogError> {
        let (catalog, capabilities) = catalog::load(config)?;
        Ok(Self::new(catalog, capabilities))
    }

    /// The role catalog this model was built from.
    #[must_use]
    pub fn catalog(&self) -> &RoleCatalog {
        &self.catalog
    }

    /// The legacy capability table.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }

    /// True if the subject is an owner or holds the permission.
    #[must_use]
    pub fn check_permission(&self, subject: &Subject, permission: &str) -> bool {
        subject.is_owner || subject.permissions.contains(permission)
    }

    /// True if the subject passes `check_permission` for any of `permissions`.
    ///
    /// An empty list is only satisfied by owners.
    #[must_use]
    pub fn check_any_permission(&self, subject: &Subject, permissions: &[&str]) -> bool {
        subject.is_owner
            || permissions
                .iter()
                .any(|p| self.check_permission(subject, p))
    }

    /// True if the subject passes `check_permission` for all of `permissions`.
    ///
    /// An empty list is satisfied by everyone.
    #[must_use]
    pub fn check_all_permissions(&self, subject: &Subject, permissions: &[&str]) -> bool {
        permissions
            .iter()
            .all(|p| self.check_permission(subject, p))
    }

    /// True if the subject may manage a role at `target_level`.
    ///
    /// Non-owners need strictly more authority, i.e. a strictly lower level.
    #[must_use]
    pub fn can_manage_level(&self, subject: &Subject, target_level: i32) -> bool {
        subject.is_owner || subject.role_level < target_level
    }

    /// Resolves a legacy capability name through `check_any_permission`.
    ///
    /// Unknown capabilities are granted to owners only.
    #[must_use]
    pub fn has_capability(&self, subject: &Subject, capability: &str) -> bool {
        match self.capabilities.permissions_for(capability) {
            Some(perms) => {
                let perms: Vec<&str> = perms.iter().map(String::as_str).collect();
                self.check_any_permission(subject, &perms)
            }
            None => subject.is_owner,
        }
    }

    /// Builds the subject for a user holding a catalog role.
    #[must_use]
    pub fn subject_for_role(&self, user_id: UserId, role_name: &str) -> Option<Subject> {
        self.catalog
            .role(role_name)
            .map(|role| Subject::from_role(user_id, role))
    }
}
