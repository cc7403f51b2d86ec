//! Append-only audit trail attached to each approval request.

use chrono::{DateTime, Utc};
use keyhold_shared::types::UserId;
use serde::{Deserialize, Serialize};

/// A state-changing operation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// The request was created.
    Created,
    /// An approval was recorded without resolving the request.
    ApprovalRecorded,
    /// The request resolved as approved.
    Approved,
    /// The request was rejected.
    Rejected,
    /// The requester cancelled the request.
    Cancelled,
    /// The request was escalated after an SLA breach.
    Escalated,
    /// The request expired after its final escalation.
    Expired,
}

/// One audit trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened.
    pub action: AuditAction,
    /// Who did it; `None` for scheduler-driven entries.
    pub performed_by: Option<UserId>,
    /// When it happened.
    pub performed_at: DateTime<Utc>,
    /// Optional comment or reason.
    pub comment: Option<String>,
}

/// Ordered audit entries. Only the engine appends; everyone else reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub(crate) fn append(
        &mut self,
        action: AuditAction,
        performed_by: Option<UserId>,
        performed_at: DateTime<Utc>,
        comment: Option<String>,
    ) {
        self.entries.push(AuditEntry {
            action,
            performed_by,
            performed_at,
            comment,
        });
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry.
    #[must_use]
    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }

    /// The recorded actions, oldest first.
    #[must_use]
    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries.iter().map(|e| e.action).collect()
    }
}
