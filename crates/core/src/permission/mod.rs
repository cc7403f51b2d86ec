//! Role/permission model that authorizes actions on approval requests.
//!
//! # Modules
//!
//! - `types` - Roles, subjects, and well-known permission strings
//! - `catalog` - Immutable role catalog and legacy capability table
//! - `model` - Permission, level, and capability checks

pub mod catalog;
pub mod model;
pub mod types;

#[cfg(test)]
mod model_props;

pub use catalog::{CapabilityMap, CatalogError, RoleCatalog};
pub use model::PermissionModel;
pub use types::{Role, Subject, perms};
