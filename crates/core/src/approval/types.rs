//! Approval request domain types.
//!
//! An approval request moves from `pending` to exactly one terminal status:
//! - Pending → Approved (enough approvals, no rejection)
//! - Pending → Rejected (any single rejection)
//! - Pending → Cancelled (requester withdraws)
//! - Pending → Expired (SLA exhausted after the last escalation)

use std::fmt;

use chrono::{DateTime, Utc};
use keyhold_shared::types::{ApprovalRequestId, ProjectId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::AuditLog;
use super::request_data::RequestData;
use crate::permission::Subject;

/// The kind of business action awaiting approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalType {
    /// Discount on a unit price.
    DiscountApproval,
    /// Cancellation of a booked sale.
    SaleCancellation,
    /// Manual override of a unit price.
    PriceOverride,
    /// Refund of a received payment.
    RefundApproval,
    /// Change to an installment plan.
    InstallmentModification,
    /// Payout of a broker commission.
    CommissionPayout,
    /// Release of an invoice.
    InvoiceApproval,
}

impl ApprovalType {
    /// Every approval type, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::DiscountApproval,
        Self::SaleCancellation,
        Self::PriceOverride,
        Self::RefundApproval,
        Self::InstallmentModification,
        Self::CommissionPayout,
        Self::InvoiceApproval,
    ];

    /// Returns the wire name of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscountApproval => "DISCOUNT_APPROVAL",
            Self::SaleCancellation => "SALE_CANCELLATION",
            Self::PriceOverride => "PRICE_OVERRIDE",
            Self::RefundApproval => "REFUND_APPROVAL",
            Self::InstallmentModification => "INSTALLMENT_MODIFICATION",
            Self::CommissionPayout => "COMMISSION_PAYOUT",
            Self::InvoiceApproval => "INVOICE_APPROVAL",
        }
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting decisions.
    Pending,
    /// Enough approvals were recorded.
    Approved,
    /// An approver vetoed the request.
    Rejected,
    /// The requester withdrew the request.
    Cancelled,
    /// The SLA ran out after the final escalation.
    Expired,
}

impl ApprovalStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Returns true once the request can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request urgency; selects the SLA budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Shortest SLA.
    Critical,
    /// Short SLA.
    High,
    /// Standard SLA.
    #[default]
    Medium,
    /// Longest SLA.
    Low,
}

impl Priority {
    /// Returns the string representation of the priority.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// The next more urgent priority. Critical stays critical.
    #[must_use]
    pub fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An individual approver's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproverDecision {
    /// No decision yet.
    Pending,
    /// The approver approved.
    Approved,
    /// The approver rejected.
    Rejected,
}

/// One eligible approver's slot on a request.
///
/// The set of slots is fixed when the request is created. Each slot moves
/// from `Pending` to a decision exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAction {
    /// The approver.
    pub approver: UserId,
    /// Role level of the approver when the request was created.
    pub role_level: i32,
    /// Whether the approver held an owner role when the request was created.
    pub is_owner: bool,
    /// Current decision.
    pub action: ApproverDecision,
    /// Comment left with the decision.
    pub comment: Option<String>,
    /// When the decision was recorded.
    pub action_at: Option<DateTime<Utc>>,
}

impl ApproverAction {
    /// Creates a pending slot for an eligible approver.
    #[must_use]
    pub fn pending(subject: &Subject) -> Self {
        Self {
            approver: subject.user_id,
            role_level: subject.role_level,
            is_owner: subject.is_owner,
            action: ApproverDecision::Pending,
            comment: None,
            action_at: None,
        }
    }

    /// Authority rank for tiering; owners outrank every level.
    #[must_use]
    pub fn authority_rank(&self) -> i32 {
        if self.is_owner {
            i32::MIN
        } else {
            self.role_level
        }
    }

    /// The approver's identity as captured at creation, without
    /// permissions. Used for level comparisons only.
    #[must_use]
    pub fn as_subject(&self) -> Subject {
        Subject {
            user_id: self.approver,
            role_level: self.role_level,
            permissions: std::collections::BTreeSet::new(),
            is_owner: self.is_owner,
        }
    }

    /// Returns true while the approver has not decided.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.action == ApproverDecision::Pending
    }
}

/// A single escalation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    /// Escalation level, starting at 1.
    pub level: u32,
    /// Approvers notified by this escalation.
    pub escalated_to: Vec<UserId>,
    /// When the escalation happened.
    pub escalated_at: DateTime<Utc>,
    /// Human-readable reason.
    pub reason: String,
    /// The deadline whose breach triggered this escalation.
    pub breached_deadline: DateTime<Utc>,
}

/// The domain entity an approval request governs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind, e.g. `sale` or `unit`.
    pub entity_type: String,
    /// Entity identifier in its owning module.
    pub entity_id: Uuid,
}

impl EntityRef {
    /// Creates an entity reference.
    pub fn new(entity_type: impl Into<String>, entity_id: Uuid) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
        }
    }
}

/// An approval request and its full decision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Request ID.
    pub id: ApprovalRequestId,
    /// Human-readable number, e.g. `APR-000042`.
    pub request_number: String,
    /// Approval type; always matches `request_data`.
    pub approval_type: ApprovalType,
    /// Validated type-specific payload.
    pub request_data: RequestData,
    /// User who raised the request.
    pub requested_by: UserId,
    /// Project the request belongs to, if any.
    pub project_id: Option<ProjectId>,
    /// Governed entity.
    pub entity: EntityRef,
    /// Lifecycle status.
    pub status: ApprovalStatus,
    /// Current priority.
    pub priority: Priority,
    /// Approvals needed to resolve as approved.
    pub required_approvals: u32,
    /// One slot per eligible approver.
    pub approver_actions: Vec<ApproverAction>,
    /// Approvers notified so far (initial tier plus escalations).
    pub engaged_approvers: Vec<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Current SLA deadline.
    pub deadline_at: DateTime<Utc>,
    /// Who resolved the request; `None` for expiry.
    pub resolved_by: Option<UserId>,
    /// When the request reached a terminal status.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Comment attached to the resolution.
    pub resolution_comment: Option<String>,
    /// Escalations, levels strictly increasing.
    pub escalation_history: Vec<EscalationRecord>,
    /// Append-only audit trail.
    pub audit_trail: AuditLog,
    /// Optimistic concurrency version, bumped on every write.
    pub version: u64,
}

impl ApprovalRequest {
    /// Number of approvers who approved.
    #[must_use]
    pub fn approved_count(&self) -> u32 {
        let count = self
            .approver_actions
            .iter()
            .filter(|a| a.action == ApproverDecision::Approved)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// The slot belonging to a user, if the user is an eligible approver.
    #[must_use]
    pub fn action_for(&self, user_id: UserId) -> Option<&ApproverAction> {
        self.approver_actions.iter().find(|a| a.approver == user_id)
    }

    /// Returns true if the user is eligible and has not decided yet.
    #[must_use]
    pub fn is_pending_approver(&self, user_id: UserId) -> bool {
        self.action_for(user_id).is_some_and(ApproverAction::is_pending)
    }

    /// Returns true if the request is pending past its deadline.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && now > self.deadline_at
    }

    /// Number of escalations recorded so far.
    #[must_use]
    pub fn escalation_level(&self) -> u32 {
        self.escalation_history.last().map_or(0, |e| e.level)
    }
}

/// Input for [`ApprovalEngine::create_request`](super::ApprovalEngine::create_request).
#[derive(Debug, Clone)]
pub struct NewApprovalRequest {
    /// Typed payload; determines the approval type.
    pub request_data: RequestData,
    /// User raising the request.
    pub requested_by: UserId,
    /// Owning project, if any.
    pub project_id: Option<ProjectId>,
    /// Governed entity.
    pub entity: EntityRef,
    /// Initial priority.
    pub priority: Priority,
    /// Approvers allowed to decide, as resolved by the caller.
    pub eligible_approvers: Vec<Subject>,
    /// Explicit approval count; policy may raise it.
    pub required_approvals: Option<u32>,
}

impl NewApprovalRequest {
    /// Creates an input with medium priority and policy-driven approval count.
    #[must_use]
    pub fn new(
        request_data: RequestData,
        requested_by: UserId,
        entity: EntityRef,
        eligible_approvers: Vec<Subject>,
    ) -> Self {
        Self {
            request_data,
            requested_by,
            project_id: None,
            entity,
            priority: Priority::default(),
            eligible_approvers,
            required_approvals: None,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the owning project.
    #[must_use]
    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Requests an explicit number of approvals.
    #[must_use]
    pub fn with_required_approvals(mut self, required: u32) -> Self {
        self.required_approvals = Some(required);
        self
    }
}

/// Which actions a subject may take on a request right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AvailableActions {
    /// The subject may approve.
    pub can_approve: bool,
    /// The subject may reject.
    pub can_reject: bool,
    /// The subject may cancel.
    pub can_cancel: bool,
}
