//! Outbound notifications and resolution callbacks.
//!
//! Both are dispatched after a transition commits. A failing sink is
//! logged and never undoes the transition.

use std::fmt::Debug;

use keyhold_shared::types::{ApprovalRequestId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::types::{ApprovalRequest, ApprovalStatus, ApprovalType};

/// Event emitted after a committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// A request was created.
    Created {
        /// The request.
        request_id: ApprovalRequestId,
        /// Human-readable number.
        request_number: String,
        /// Approval type.
        approval_type: ApprovalType,
        /// Approvers to notify.
        notify: Vec<UserId>,
    },
    /// A request was escalated.
    Escalated {
        /// The request.
        request_id: ApprovalRequestId,
        /// New escalation level.
        level: u32,
        /// Approvers to notify.
        notify: Vec<UserId>,
    },
    /// A request reached a terminal status.
    Resolved {
        /// The request.
        request_id: ApprovalRequestId,
        /// Approval type.
        approval_type: ApprovalType,
        /// Terminal status.
        status: ApprovalStatus,
        /// Resolving user; `None` for expiry.
        resolved_by: Option<UserId>,
        /// Requester, who is always told about the outcome.
        requested_by: UserId,
    },
}

impl ApprovalEvent {
    /// The request the event is about.
    #[must_use]
    pub fn request_id(&self) -> ApprovalRequestId {
        match self {
            Self::Created { request_id, .. }
            | Self::Escalated { request_id, .. }
            | Self::Resolved { request_id, .. } => *request_id,
        }
    }

    /// Short event name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Escalated { .. } => "escalated",
            Self::Resolved { .. } => "resolved",
        }
    }
}

/// Failure of a notification sink or resolution handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The receiving side of a channel was dropped.
    #[error("Notification channel closed")]
    ChannelClosed,

    /// A handler reported a failure.
    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Receives approval events. Must not block.
pub trait Notifier: Send + Sync + Debug {
    /// Delivers one event.
    fn notify(&self, event: &ApprovalEvent) -> Result<(), DispatchError>;
}

/// Writes events to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &ApprovalEvent) -> Result<(), DispatchError> {
        tracing::info!(
            request_id = %event.request_id(),
            event = event.name(),
            "Approval notification"
        );
        Ok(())
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<ApprovalEvent>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ApprovalEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &ApprovalEvent) -> Result<(), DispatchError> {
        self.sender
            .send(event.clone())
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

/// Callback a domain module registers for one approval type.
///
/// Invoked once, on a background task, when a request of that type
/// reaches a terminal status.
pub trait ResolutionHandler: Send + Sync {
    /// Handles the resolved request.
    fn on_resolved(&self, request: &ApprovalRequest) -> Result<(), DispatchError>;
}

impl<F> ResolutionHandler for F
where
    F: Fn(&ApprovalRequest) -> Result<(), DispatchError> + Send + Sync,
{
    fn on_resolved(&self, request: &ApprovalRequest) -> Result<(), DispatchError> {
        self(request)
    }
}
