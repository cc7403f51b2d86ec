//! Core business logic for Keyhold.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Callers supply identities, persistence and notification sinks through traits.
//!
//! # Modules
//!
//! - `permission` - Role levels, permission strings, owner bypass, legacy capabilities
//! - `approval` - Approval request lifecycle, SLA escalation, audit trail

pub mod approval;
pub mod permission;

pub use approval::{
    ApprovalEngine, ApprovalError, ApprovalPolicy, ApprovalRequest, ApprovalStatus, ApprovalType,
    EscalationScheduler, RequestData,
};
pub use permission::{PermissionModel, Subject};
