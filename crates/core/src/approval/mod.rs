//! Approval request workflow.
//!
//! Domain modules raise approval requests for sensitive actions (discounts,
//! cancellations, refunds, payouts). Eligible approvers approve or reject,
//! requesters may cancel, and a background scheduler escalates requests
//! that miss their SLA.
//!
//! # Lifecycle
//!
//! - A request starts `pending` with one slot per eligible approver.
//! - It becomes `approved` once `required_approvals` slots approve.
//! - A single rejection resolves it as `rejected`.
//! - The requester may `cancel` it while pending.
//! - Overdue requests escalate to more senior approvers, and `expire`
//!   once the escalation levels run out.
//!
//! All four outcomes are terminal.

pub mod audit;
pub mod clock;
pub mod engine;
pub mod error;
pub mod notify;
pub mod policy;
pub mod request_data;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ApprovalEngine, EscalationOutcome};
pub use error::{ApprovalError, ErrorKind};
pub use notify::{
    ApprovalEvent, ChannelNotifier, DispatchError, Notifier, ResolutionHandler, TracingNotifier,
};
pub use policy::ApprovalPolicy;
pub use request_data::{
    CommissionPayoutData, DiscountApprovalData, InstallmentModificationData, InvoiceApprovalData,
    PriceOverrideData, RefundApprovalData, RequestData, RequestDataError, SaleCancellationData,
};
pub use scheduler::{EscalationScheduler, ScanReport};
pub use store::{ApprovalFilter, ApprovalStore, InMemoryApprovalStore};
pub use types::{
    ApprovalRequest, ApprovalStatus, ApprovalType, ApproverAction, ApproverDecision,
    AvailableActions, EntityRef, EscalationRecord, NewApprovalRequest, Priority,
};
