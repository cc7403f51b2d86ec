//! Approval workflow error types.
//!
//! Every error maps onto one [`ErrorKind`] so callers can branch on the
//! taxonomy without matching individual variants.

use keyhold_shared::types::{ApprovalRequestId, UserId};
use thiserror::Error;

use super::request_data::RequestDataError;
use super::types::ApprovalStatus;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input.
    Validation,
    /// The caller may not perform the action.
    Forbidden,
    /// The request is not in a state that allows the action.
    InvalidState,
    /// A concurrent writer won.
    Conflict,
    /// The request does not exist.
    NotFound,
    /// The request expired.
    Expired,
}

/// Errors that can occur during approval workflow operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// Invalid input outside the request payload.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request payload failed validation.
    #[error(transparent)]
    InvalidRequestData(#[from] RequestDataError),

    /// Rejection reason is required but not provided.
    #[error("Rejection reason is required")]
    RejectionReasonRequired,

    /// The caller lacks a required permission.
    #[error("User {user_id} lacks permission '{permission}'")]
    MissingPermission {
        /// The caller.
        user_id: UserId,
        /// The missing permission.
        permission: &'static str,
    },

    /// The caller is not an eligible approver for the request.
    #[error("User {user_id} is not an eligible approver for this request")]
    NotEligible {
        /// The caller.
        user_id: UserId,
    },

    /// The caller already recorded a decision.
    #[error("User {user_id} has already acted on this request")]
    AlreadyActed {
        /// The caller.
        user_id: UserId,
    },

    /// Only the requester may cancel.
    #[error("User {user_id} did not raise this request")]
    NotRequester {
        /// The caller.
        user_id: UserId,
    },

    /// The action is not allowed in the current status.
    #[error("Cannot {action} a request that is {status}")]
    InvalidState {
        /// The current status.
        status: ApprovalStatus,
        /// The attempted action.
        action: &'static str,
    },

    /// A concurrent operation prevented this write.
    #[error("Request {request_id} was modified concurrently: {reason}")]
    Conflict {
        /// The contended request.
        request_id: ApprovalRequestId,
        /// What went wrong.
        reason: String,
    },

    /// Approval request not found.
    #[error("Approval request {0} not found")]
    NotFound(ApprovalRequestId),

    /// The request expired before it was resolved.
    #[error("Approval request {0} has expired")]
    Expired(ApprovalRequestId),
}

impl ApprovalError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidRequestData(_) | Self::RejectionReasonRequired => {
                ErrorKind::Validation
            }
            Self::MissingPermission { .. }
            | Self::NotEligible { .. }
            | Self::AlreadyActed { .. }
            | Self::NotRequester { .. } => ErrorKind::Forbidden,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Expired(_) => ErrorKind::Expired,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidState | ErrorKind::Conflict => 409,
            ErrorKind::Expired => 410,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidRequestData(e) => e.error_code(),
            Self::RejectionReasonRequired => "REJECTION_REASON_REQUIRED",
            Self::MissingPermission { .. } => "MISSING_PERMISSION",
            Self::NotEligible { .. } => "NOT_ELIGIBLE_APPROVER",
            Self::AlreadyActed { .. } => "ALREADY_ACTED",
            Self::NotRequester { .. } => "NOT_REQUESTER",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound(_) => "APPROVAL_REQUEST_NOT_FOUND",
            Self::Expired(_) => "APPROVAL_REQUEST_EXPIRED",
        }
    }
}

impl RequestDataError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        400
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "MALFORMED_REQUEST_DATA",
            Self::NotPositive { .. } => "AMOUNT_NOT_POSITIVE",
            Self::PercentageOutOfRange { .. } => "PERCENTAGE_OUT_OF_RANGE",
            Self::Blank { .. } => "REQUIRED_FIELD_MISSING",
            Self::Inconsistent(_) => "INCONSISTENT_REQUEST_DATA",
        }
    }
}
