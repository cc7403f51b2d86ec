//! Versioned storage for approval requests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keyhold_shared::types::{ApprovalRequestId, ProjectId, UserId};
use serde::{Deserialize, Serialize};

use super::error::ApprovalError;
use super::types::{ApprovalRequest, ApprovalStatus, ApprovalType, EntityRef, Priority};

/// Criteria for listing requests. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFilter {
    /// Only requests in this status.
    pub status: Option<ApprovalStatus>,
    /// Only requests of this type.
    pub approval_type: Option<ApprovalType>,
    /// Only requests at this priority.
    pub priority: Option<Priority>,
    /// Only requests raised by this user.
    pub requested_by: Option<UserId>,
    /// Only requests for this project.
    pub project_id: Option<ProjectId>,
    /// Only requests governing this entity.
    pub entity: Option<EntityRef>,
    /// Only pending requests still waiting on this approver.
    pub pending_approver: Option<UserId>,
}

impl ApprovalFilter {
    /// Returns true if the request satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.approval_type.is_none_or(|t| request.approval_type == t)
            && self.priority.is_none_or(|p| request.priority == p)
            && self.requested_by.is_none_or(|u| request.requested_by == u)
            && self
                .project_id
                .is_none_or(|p| request.project_id == Some(p))
            && self.entity.as_ref().is_none_or(|e| &request.entity == e)
            && self.pending_approver.is_none_or(|u| {
                request.status == ApprovalStatus::Pending && request.is_pending_approver(u)
            })
    }
}

/// Storage for approval requests with optimistic concurrency.
///
/// Every successful write bumps `version`; writers state the version they
/// read and lose with `Conflict` if someone else wrote first.
pub trait ApprovalStore: Send + Sync {
    /// Stores a new request.
    fn insert(&self, request: ApprovalRequest) -> Result<(), ApprovalError>;

    /// Fetches a request by ID.
    fn get(&self, id: ApprovalRequestId) -> Option<ApprovalRequest>;

    /// Replaces a request if its stored version equals `expected_version`.
    ///
    /// Returns the stored request with its new version.
    fn compare_and_swap(
        &self,
        request: ApprovalRequest,
        expected_version: u64,
    ) -> Result<ApprovalRequest, ApprovalError>;

    /// All requests matching the filter, in no particular order.
    fn list(&self, filter: &ApprovalFilter) -> Vec<ApprovalRequest>;

    /// IDs of pending requests whose deadline is before `now`, most
    /// overdue first.
    fn overdue_pending(&self, now: DateTime<Utc>) -> Vec<ApprovalRequestId>;
}

/// Process-local store backed by a concurrent hash map.
#[derive(Debug, Default)]
pub struct InMemoryApprovalStore {
    requests: DashMap<ApprovalRequestId, ApprovalRequest>,
}

impl InMemoryApprovalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn insert(&self, request: ApprovalRequest) -> Result<(), ApprovalError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(ApprovalError::Conflict {
                request_id: request.id,
                reason: "request already exists".to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    fn get(&self, id: ApprovalRequestId) -> Option<ApprovalRequest> {
        self.requests.get(&id).map(|r| r.value().clone())
    }

    fn compare_and_swap(
        &self,
        mut request: ApprovalRequest,
        expected_version: u64,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let id = request.id;
        let mut stored = self
            .requests
            .get_mut(&id)
            .ok_or(ApprovalError::NotFound(id))?;

        if stored.version != expected_version {
            return Err(ApprovalError::Conflict {
                request_id: id,
                reason: format!(
                    "expected version {expected_version}, found {}",
                    stored.version
                ),
            });
        }

        request.version = expected_version + 1;
        *stored = request.clone();
        Ok(request)
    }

    fn list(&self, filter: &ApprovalFilter) -> Vec<ApprovalRequest> {
        self.requests
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    fn overdue_pending(&self, now: DateTime<Utc>) -> Vec<ApprovalRequestId> {
        let mut overdue: Vec<_> = self
            .requests
            .iter()
            .filter(|r| r.is_overdue(now))
            .map(|r| (r.deadline_at, r.id))
            .collect();
        overdue.sort_unstable();
        overdue.into_iter().map(|(_, id)| id).collect()
    }
}
