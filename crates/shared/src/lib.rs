//! Shared identifiers, pagination, and configuration for Keyhold.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Pagination types for list queries
//! - Configuration management (approval policy, scheduler, role catalog)

pub mod config;
pub mod types;

pub use config::{
    AppConfig, ApprovalPolicyConfig, PermissionsConfig, RoleConfig, SchedulerConfig,
    SlaHoursConfig,
};
