//! Immutable role catalog and legacy capability table.
//!
//! Both are built once from [`PermissionsConfig`] at startup and handed to
//! the [`PermissionModel`](super::PermissionModel). Nothing mutates them
//! afterwards.

use std::collections::{BTreeMap, BTreeSet};

use keyhold_shared::{PermissionsConfig, RoleConfig};
use thiserror::Error;

use super::types::Role;

/// Errors raised while building the role catalog from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A permission string is not of the form `module:action`.
    #[error("Invalid permission string '{0}', expected module:action")]
    InvalidPermission(String),

    /// Two roles share a name.
    #[error("Duplicate role '{0}'")]
    DuplicateRole(String),

    /// A role has an empty name.
    #[error("Role name cannot be empty")]
    EmptyRoleName,

    /// A capability has an empty name.
    #[error("Capability name cannot be empty")]
    EmptyCapabilityName,
}

impl CatalogError {
    /// Returns the HTTP status code for this error.
    ///
    /// A broken catalog is a server misconfiguration.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        500
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPermission(_) => "INVALID_PERMISSION",
            Self::DuplicateRole(_) => "DUPLICATE_ROLE",
            Self::EmptyRoleName => "EMPTY_ROLE_NAME",
            Self::EmptyCapabilityName => "EMPTY_CAPABILITY_NAME",
        }
    }
}

/// Checks that a permission string is `module:action` with lowercase
/// alphanumeric/underscore segments.
#[must_use]
pub fn is_valid_permission(permission: &str) -> bool {
    let Some((module, action)) = permission.split_once(':') else {
        return false;
    };

    let valid_segment = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };

    valid_segment(module) && valid_segment(action)
}

fn validated_permissions(raw: &[String]) -> Result<BTreeSet<String>, CatalogError> {
    raw.iter()
        .map(|p| {
            let p = p.trim();
            if is_valid_permission(p) {
                Ok(p.to_string())
            } else {
                Err(CatalogError::InvalidPermission(p.to_string()))
            }
        })
        .collect()
}

/// The set of roles known to the system, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleCatalog {
    roles: BTreeMap<String, Role>,
}

impl RoleCatalog {
    /// Builds a catalog from role definitions.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate or empty role names and malformed
    /// permission strings.
    pub fn from_config(roles: &[RoleConfig]) -> Result<Self, CatalogError> {
        let mut catalog = BTreeMap::new();

        for role in roles {
            let key = role.name.trim().to_lowercase();
            if key.is_empty() {
                return Err(CatalogError::EmptyRoleName);
            }
            if catalog.contains_key(&key) {
                return Err(CatalogError::DuplicateRole(role.name.clone()));
            }

            let built = Role {
                name: role.name.trim().to_string(),
                level: role.level,
                permissions: validated_permissions(&role.permissions)?,
                is_owner_role: role.is_owner_role,
            };
            catalog.insert(key, built);
        }

        Ok(Self { roles: catalog })
    }

    /// Looks up a role by name (case-insensitive).
    #[must_use]
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(&name.trim().to_lowercase())
    }

    /// Returns roles ordered from most to least authority.
    pub fn roles_by_authority(&self) -> Vec<&Role> {
        let mut roles: Vec<_> = self.roles.values().collect();
        roles.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        roles
    }

    /// Number of roles in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if the catalog has no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Legacy coarse capability names mapped to fine-grained permissions.
///
/// Older call sites ask "can this role do X broadly"; a capability is
/// granted when the subject holds any of its permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMap {
    capabilities: BTreeMap<String, BTreeSet<String>>,
}

impl CapabilityMap {
    /// Builds the capability table from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error on empty capability names and malformed permissions.
    pub fn from_config(table: &BTreeMap<String, Vec<String>>) -> Result<Self, CatalogError> {
        let mut capabilities = BTreeMap::new();

        for (name, perms) in table {
            let name = name.trim();
            if name.is_empty() {
                return Err(CatalogError::EmptyCapabilityName);
            }
            capabilities.insert(name.to_string(), validated_permissions(perms)?);
        }

        Ok(Self { capabilities })
    }

    /// Permissions that satisfy a capability, if it exists.
    #[must_use]
    pub fn permissions_for(&self, capability: &str) -> Option<&BTreeSet<String>> {
        self.capabilities.get(capability)
    }

    /// Names of all known capabilities.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }
}

/// Builds both tables from the `permissions` configuration section.
///
/// # Errors
///
/// Propagates any [`CatalogError`] from either table.
pub fn load(config: &PermissionsConfig) -> Result<(RoleCatalog, CapabilityMap), CatalogError> {
    Ok((
        RoleCatalog::from_config(&config.roles)?,
        CapabilityMap::from_config(&config.capabilities)?,
    ))
}
