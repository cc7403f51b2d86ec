//! Approval workflow engine.
//!
//! The engine is the only writer of approval request state. Every mutating
//! operation runs under a per-request lock with a bounded wait and commits
//! through a compare-and-swap on the request version, so concurrent callers
//! (users and the escalation scheduler) never overwrite each other.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use keyhold_shared::types::{ApprovalRequestId, PageRequest, PageResponse, UserId};
use tokio::sync::Mutex;

use super::audit::{AuditAction, AuditLog};
use super::clock::{Clock, SystemClock};
use super::error::ApprovalError;
use super::notify::{ApprovalEvent, Notifier, ResolutionHandler, TracingNotifier};
use super::policy::ApprovalPolicy;
use super::store::{ApprovalFilter, ApprovalStore, InMemoryApprovalStore};
use super::types::{
    ApprovalRequest, ApprovalStatus, ApprovalType, ApproverAction, ApproverDecision,
    AvailableActions, EscalationRecord, NewApprovalRequest,
};
use crate::permission::{PermissionModel, Subject, perms};

/// Result of a single escalation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// A new escalation level was recorded.
    Escalated {
        /// The level just recorded.
        level: u32,
    },
    /// Escalation levels were exhausted and the request expired.
    Expired,
    /// The request is not past its deadline.
    NotDue,
    /// The current overdue window was already escalated.
    AlreadyEscalated,
}

/// Orchestrates the approval request lifecycle.
pub struct ApprovalEngine {
    store: Arc<dyn ApprovalStore>,
    permissions: Arc<PermissionModel>,
    policy: ApprovalPolicy,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    handlers: DashMap<ApprovalType, Vec<Arc<dyn ResolutionHandler>>>,
    locks: DashMap<ApprovalRequestId, Arc<Mutex<()>>>,
    sequence: AtomicU64,
}

fn clean_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn ensure_pending(request: &ApprovalRequest, action: &'static str) -> Result<(), ApprovalError> {
    match request.status {
        ApprovalStatus::Pending => Ok(()),
        ApprovalStatus::Expired => Err(ApprovalError::Expired(request.id)),
        status => Err(ApprovalError::InvalidState { status, action }),
    }
}

/// Least-authority tiers first, until enough approvers are engaged.
fn initial_engagement(actions: &[ApproverAction], required: u32) -> Vec<UserId> {
    let required = usize::try_from(required).unwrap_or(usize::MAX);

    let mut ranks: Vec<i32> = actions.iter().map(ApproverAction::authority_rank).collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));
    ranks.dedup();

    let mut engaged = Vec::new();
    for rank in ranks {
        engaged.extend(
            actions
                .iter()
                .filter(|a| a.authority_rank() == rank)
                .map(|a| a.approver),
        );
        if engaged.len() >= required {
            break;
        }
    }
    engaged
}

fn newest_first(a: &ApprovalRequest, b: &ApprovalRequest) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.request_number.len().cmp(&a.request_number.len()))
        .then_with(|| b.request_number.cmp(&a.request_number))
}

fn run_handler(handler: &dyn ResolutionHandler, request: &ApprovalRequest) {
    if let Err(e) = handler.on_resolved(request) {
        tracing::warn!(
            request_id = %request.id,
            approval_type = %request.approval_type,
            error = %e,
            "Resolution handler failed"
        );
    }
}

impl ApprovalEngine {
    /// Creates an engine with an in-memory store, the system clock and a
    /// log-only notifier.
    #[must_use]
    pub fn new(permissions: Arc<PermissionModel>, policy: ApprovalPolicy) -> Self {
        Self {
            store: Arc::new(InMemoryApprovalStore::new()),
            permissions,
            policy,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(TracingNotifier),
            handlers: DashMap::new(),
            locks: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Replaces the request store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ApprovalStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// The permission model used for every check.
    #[must_use]
    pub fn permissions(&self) -> &PermissionModel {
        &self.permissions
    }

    /// Registers a callback for requests of one type reaching a terminal
    /// status.
    pub fn register_resolution_handler(
        &self,
        approval_type: ApprovalType,
        handler: Arc<dyn ResolutionHandler>,
    ) {
        self.handlers.entry(approval_type).or_default().push(handler);
    }

    // ========================================================================
    // Mutating operations
    // ========================================================================

    /// Creates a pending approval request.
    ///
    /// The payload is validated, the deadline is derived from the priority,
    /// and one pending slot is opened per eligible approver. The least
    /// senior approvers are notified first.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid payload, an empty or
    /// duplicated approver list, a requester listed as approver, or an
    /// approval count the approver list cannot satisfy.
    pub fn create_request(
        &self,
        input: NewApprovalRequest,
    ) -> Result<ApprovalRequest, ApprovalError> {
        input.request_data.validate()?;

        if input.eligible_approvers.is_empty() {
            return Err(ApprovalError::Validation(
                "at least one eligible approver is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for approver in &input.eligible_approvers {
            if approver.user_id == input.requested_by {
                return Err(ApprovalError::Validation(
                    "the requester cannot approve their own request".to_string(),
                ));
            }
            if !seen.insert(approver.user_id) {
                return Err(ApprovalError::Validation(format!(
                    "approver {} is listed more than once",
                    approver.user_id
                )));
            }
        }

        if input.required_approvals == Some(0) {
            return Err(ApprovalError::Validation(
                "required approvals must be at least 1".to_string(),
            ));
        }

        let policy_minimum = self.policy.required_approvals_for(&input.request_data);
        let required_approvals = input
            .required_approvals
            .map_or(policy_minimum, |n| n.max(policy_minimum));
        let approver_count = u32::try_from(input.eligible_approvers.len()).unwrap_or(u32::MAX);
        if required_approvals > approver_count {
            return Err(ApprovalError::Validation(format!(
                "{required_approvals} approvals required but only {approver_count} eligible approvers"
            )));
        }

        let now = self.clock.now();
        let approver_actions: Vec<ApproverAction> = input
            .eligible_approvers
            .iter()
            .map(ApproverAction::pending)
            .collect();
        let engaged_approvers = initial_engagement(&approver_actions, required_approvals);

        let number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut audit_trail = AuditLog::default();
        audit_trail.append(AuditAction::Created, Some(input.requested_by), now, None);

        let request = ApprovalRequest {
            id: ApprovalRequestId::new(),
            request_number: format!("APR-{number:06}"),
            approval_type: input.request_data.approval_type(),
            request_data: input.request_data,
            requested_by: input.requested_by,
            project_id: input.project_id,
            entity: input.entity,
            status: ApprovalStatus::Pending,
            priority: input.priority,
            required_approvals,
            approver_actions,
            engaged_approvers,
            created_at: now,
            deadline_at: self.policy.deadline_for(input.priority, now),
            resolved_by: None,
            resolved_at: None,
            resolution_comment: None,
            escalation_history: Vec::new(),
            audit_trail,
            version: 0,
        };

        self.store.insert(request.clone())?;

        tracing::info!(
            request_id = %request.id,
            request_number = %request.request_number,
            approval_type = %request.approval_type,
            priority = %request.priority,
            required_approvals,
            "Approval request created"
        );

        self.notify(&ApprovalEvent::Created {
            request_id: request.id,
            request_number: request.request_number.clone(),
            approval_type: request.approval_type,
            notify: request.engaged_approvers.clone(),
        });

        Ok(request)
    }

    /// Records an approval.
    ///
    /// The request resolves as approved once the approval count reaches
    /// `required_approvals`.
    ///
    /// # Errors
    ///
    /// `Forbidden` if the approver lacks `approvals:approve`, is not
    /// eligible, or already acted. `InvalidState`/`Expired` if the request
    /// is no longer pending. `Conflict` on lock timeout or a lost write.
    pub async fn approve(
        &self,
        request_id: ApprovalRequestId,
        approver: &Subject,
        comment: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let comment = clean_comment(comment);

        let (request, ()) = self
            .transition(request_id, |req, now| {
                let index = self.decision_slot(req, approver, "approve")?;

                let slot = &mut req.approver_actions[index];
                slot.action = ApproverDecision::Approved;
                slot.comment.clone_from(&comment);
                slot.action_at = Some(now);

                if req.approved_count() >= req.required_approvals {
                    req.status = ApprovalStatus::Approved;
                    req.resolved_by = Some(approver.user_id);
                    req.resolved_at = Some(now);
                    req.resolution_comment.clone_from(&comment);
                    req.audit_trail.append(
                        AuditAction::Approved,
                        Some(approver.user_id),
                        now,
                        comment,
                    );
                } else {
                    req.audit_trail.append(
                        AuditAction::ApprovalRecorded,
                        Some(approver.user_id),
                        now,
                        comment,
                    );
                }
                Ok(())
            })
            .await?;

        tracing::info!(
            request_id = %request.id,
            approver = %approver.user_id,
            approvals = request.approved_count(),
            required = request.required_approvals,
            status = %request.status,
            "Approval recorded"
        );

        self.after_commit(&request);
        Ok(request)
    }

    /// Records a rejection, which resolves the request immediately.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank reason, then the same errors as
    /// [`approve`](Self::approve).
    pub async fn reject(
        &self,
        request_id: ApprovalRequestId,
        approver: &Subject,
        comment: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(ApprovalError::RejectionReasonRequired);
        }

        let (request, ()) = self
            .transition(request_id, |req, now| {
                let index = self.decision_slot(req, approver, "reject")?;

                let slot = &mut req.approver_actions[index];
                slot.action = ApproverDecision::Rejected;
                slot.comment = Some(comment.to_string());
                slot.action_at = Some(now);

                req.status = ApprovalStatus::Rejected;
                req.resolved_by = Some(approver.user_id);
                req.resolved_at = Some(now);
                req.resolution_comment = Some(comment.to_string());
                req.audit_trail.append(
                    AuditAction::Rejected,
                    Some(approver.user_id),
                    now,
                    Some(comment.to_string()),
                );
                Ok(())
            })
            .await?;

        tracing::info!(
            request_id = %request.id,
            approver = %approver.user_id,
            "Approval request rejected"
        );

        self.after_commit(&request);
        Ok(request)
    }

    /// Withdraws a pending request. Only the requester may cancel.
    ///
    /// # Errors
    ///
    /// `Forbidden` for anyone but the requester, `InvalidState`/`Expired`
    /// once the request is resolved.
    pub async fn cancel(
        &self,
        request_id: ApprovalRequestId,
        requester: &Subject,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let reason = clean_comment(reason);

        let (request, ()) = self
            .transition(request_id, |req, now| {
                if req.requested_by != requester.user_id {
                    return Err(ApprovalError::NotRequester {
                        user_id: requester.user_id,
                    });
                }
                ensure_pending(req, "cancel")?;

                req.status = ApprovalStatus::Cancelled;
                req.resolved_by = Some(requester.user_id);
                req.resolved_at = Some(now);
                req.resolution_comment.clone_from(&reason);
                req.audit_trail.append(
                    AuditAction::Cancelled,
                    Some(requester.user_id),
                    now,
                    reason,
                );
                Ok(())
            })
            .await?;

        tracing::info!(request_id = %request.id, "Approval request cancelled");

        self.after_commit(&request);
        Ok(request)
    }

    /// Escalates an overdue request, or expires it once escalation levels
    /// are exhausted.
    ///
    /// Calling this twice within the same overdue window records a single
    /// escalation.
    ///
    /// # Errors
    ///
    /// `InvalidState`/`Expired` if the request is not pending, `NotFound`,
    /// or `Conflict` on lock timeout or a lost write.
    pub async fn escalate(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<EscalationOutcome, ApprovalError> {
        let (request, outcome) = self
            .transition(request_id, |req, now| self.apply_escalation(req, now))
            .await?;

        match outcome {
            EscalationOutcome::Escalated { level } => {
                let notify = request
                    .escalation_history
                    .last()
                    .map(|e| e.escalated_to.clone())
                    .unwrap_or_default();

                tracing::warn!(
                    request_id = %request.id,
                    level,
                    priority = %request.priority,
                    deadline_at = %request.deadline_at,
                    "Approval request escalated"
                );

                self.notify(&ApprovalEvent::Escalated {
                    request_id: request.id,
                    level,
                    notify,
                });
            }
            EscalationOutcome::Expired => {
                tracing::warn!(
                    request_id = %request.id,
                    levels = request.escalation_level(),
                    "Approval request expired"
                );
                self.after_commit(&request);
            }
            EscalationOutcome::NotDue | EscalationOutcome::AlreadyEscalated => {
                tracing::debug!(
                    request_id = %request.id,
                    outcome = ?outcome,
                    "Escalation skipped"
                );
            }
        }

        Ok(outcome)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Fetches a request.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such request exists.
    pub fn get_request(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<ApprovalRequest, ApprovalError> {
        self.store
            .get(request_id)
            .ok_or(ApprovalError::NotFound(request_id))
    }

    /// Lists requests matching a filter, newest first.
    pub fn list_requests(
        &self,
        filter: &ApprovalFilter,
        page: &PageRequest,
    ) -> PageResponse<ApprovalRequest> {
        let mut requests = self.store.list(filter);
        requests.sort_by(newest_first);

        let total = u64::try_from(requests.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);

        let data = requests.into_iter().skip(offset).take(limit).collect();
        PageResponse::new(data, page.page, page.per_page, total)
    }

    /// IDs of pending requests past their deadline, most overdue first.
    pub fn overdue_request_ids(&self) -> Vec<ApprovalRequestId> {
        self.store.overdue_pending(self.clock.now())
    }

    /// True if the subject may approve or reject the request right now.
    #[must_use]
    pub fn is_actionable(&self, request: &ApprovalRequest, subject: &Subject) -> bool {
        request.status == ApprovalStatus::Pending
            && self
                .permissions
                .check_permission(subject, perms::APPROVALS_APPROVE)
            && request.is_pending_approver(subject.user_id)
    }

    /// True if the subject may cancel the request right now.
    #[must_use]
    pub fn can_cancel(&self, request: &ApprovalRequest, subject: &Subject) -> bool {
        request.status == ApprovalStatus::Pending && request.requested_by == subject.user_id
    }

    /// Every action the subject may take on the request right now.
    #[must_use]
    pub fn available_actions(
        &self,
        request: &ApprovalRequest,
        subject: &Subject,
    ) -> AvailableActions {
        let actionable = self.is_actionable(request, subject);
        AvailableActions {
            can_approve: actionable,
            can_reject: actionable,
            can_cancel: self.can_cancel(request, subject),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Runs `apply` against the latest stored state under the request lock
    /// and commits the result with a compare-and-swap.
    ///
    /// Unchanged requests are not written. Once the request is terminal the
    /// last caller to leave the lock drops its table entry.
    async fn transition<T>(
        &self,
        request_id: ApprovalRequestId,
        apply: impl FnOnce(&mut ApprovalRequest, DateTime<Utc>) -> Result<T, ApprovalError>,
    ) -> Result<(ApprovalRequest, T), ApprovalError> {
        if self.store.get(request_id).is_none() {
            return Err(ApprovalError::NotFound(request_id));
        }

        let lock = Arc::clone(&self.locks.entry(request_id).or_default());
        let guard = tokio::time::timeout(self.policy.lock_timeout(), lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(request_id = %request_id, "Timed out waiting for request lock");
                ApprovalError::Conflict {
                    request_id,
                    reason: "timed out waiting for request lock".to_string(),
                }
            })?;

        let current = self
            .store
            .get(request_id)
            .ok_or(ApprovalError::NotFound(request_id))?;
        let was_terminal = current.status.is_terminal();
        let result = self.commit(current, apply);
        drop(guard);

        let is_terminal = match &result {
            Ok((request, _)) => request.status.is_terminal(),
            Err(_) => was_terminal,
        };
        if is_terminal {
            self.locks
                .remove_if(&request_id, |_, lock| Arc::strong_count(lock) == 1);
        }

        result
    }

    fn commit<T>(
        &self,
        current: ApprovalRequest,
        apply: impl FnOnce(&mut ApprovalRequest, DateTime<Utc>) -> Result<T, ApprovalError>,
    ) -> Result<(ApprovalRequest, T), ApprovalError> {
        let mut next = current.clone();
        let outcome = apply(&mut next, self.clock.now())?;

        if next == current {
            return Ok((current, outcome));
        }

        let saved = self.store.compare_and_swap(next, current.version)?;
        Ok((saved, outcome))
    }

    /// Permission, eligibility, state, then prior decision.
    fn decision_slot(
        &self,
        request: &ApprovalRequest,
        subject: &Subject,
        action: &'static str,
    ) -> Result<usize, ApprovalError> {
        if !self
            .permissions
            .check_permission(subject, perms::APPROVALS_APPROVE)
        {
            return Err(ApprovalError::MissingPermission {
                user_id: subject.user_id,
                permission: perms::APPROVALS_APPROVE,
            });
        }

        let index = request
            .approver_actions
            .iter()
            .position(|a| a.approver == subject.user_id)
            .ok_or(ApprovalError::NotEligible {
                user_id: subject.user_id,
            })?;

        ensure_pending(request, action)?;

        if !request.approver_actions[index].is_pending() {
            return Err(ApprovalError::AlreadyActed {
                user_id: subject.user_id,
            });
        }

        Ok(index)
    }

    fn apply_escalation(
        &self,
        req: &mut ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, ApprovalError> {
        ensure_pending(req, "escalate")?;

        if now <= req.deadline_at {
            return Ok(EscalationOutcome::NotDue);
        }

        if req
            .escalation_history
            .last()
            .is_some_and(|e| e.breached_deadline == req.deadline_at)
        {
            return Ok(EscalationOutcome::AlreadyEscalated);
        }

        let performed = u32::try_from(req.escalation_history.len()).unwrap_or(u32::MAX);
        if performed >= self.policy.max_escalation_levels() {
            let comment = format!("SLA exhausted after {performed} escalation(s)");
            req.status = ApprovalStatus::Expired;
            req.resolved_at = Some(now);
            req.resolution_comment = Some(comment.clone());
            req.audit_trail
                .append(AuditAction::Expired, None, now, Some(comment));
            return Ok(EscalationOutcome::Expired);
        }

        let breached = req.deadline_at;
        let next_tier = self.next_tier(req);
        let (escalated_to, reason) = if next_tier.is_empty() {
            let current: Vec<UserId> = req
                .engaged_approvers
                .iter()
                .copied()
                .filter(|u| req.is_pending_approver(*u))
                .collect();
            (
                current,
                format!(
                    "SLA deadline {} breached; no higher tier, reminding current approvers",
                    breached.to_rfc3339()
                ),
            )
        } else {
            req.engaged_approvers.extend(next_tier.iter().copied());
            (
                next_tier,
                format!("SLA deadline {} breached", breached.to_rfc3339()),
            )
        };

        let level = req.escalation_level() + 1;
        req.escalation_history.push(EscalationRecord {
            level,
            escalated_to,
            escalated_at: now,
            reason: reason.clone(),
            breached_deadline: breached,
        });
        // Never in the past, or the next scan would escalate the same window.
        req.deadline_at = self.policy.escalated_deadline(breached, now);
        if self.policy.raise_priority_on_escalation() {
            req.priority = req.priority.raised();
        }
        req.audit_trail
            .append(AuditAction::Escalated, None, now, Some(reason));

        Ok(EscalationOutcome::Escalated { level })
    }

    /// The closest tier of undecided, not-yet-engaged approvers with more
    /// authority than the most senior engaged approver.
    fn next_tier(&self, req: &ApprovalRequest) -> Vec<UserId> {
        let senior_engaged = req
            .approver_actions
            .iter()
            .filter(|a| req.engaged_approvers.contains(&a.approver))
            .map(ApproverAction::authority_rank)
            .min();

        let candidates: Vec<&ApproverAction> = req
            .approver_actions
            .iter()
            .filter(|a| a.is_pending() && !req.engaged_approvers.contains(&a.approver))
            .filter(|a| {
                senior_engaged.is_none_or(|level| {
                    self.permissions.can_manage_level(&a.as_subject(), level)
                })
            })
            .collect();

        let Some(tier) = candidates.iter().map(|a| a.authority_rank()).max() else {
            return Vec::new();
        };

        candidates
            .into_iter()
            .filter(|a| a.authority_rank() == tier)
            .map(|a| a.approver)
            .collect()
    }

    fn notify(&self, event: &ApprovalEvent) {
        if let Err(e) = self.notifier.notify(event) {
            tracing::warn!(
                request_id = %event.request_id(),
                event = event.name(),
                error = %e,
                "Notification dispatch failed"
            );
        }
    }

    /// Post-commit work for terminal transitions: resolution event and
    /// registered handlers.
    fn after_commit(&self, request: &ApprovalRequest) {
        if !request.status.is_terminal() {
            return;
        }

        self.notify(&ApprovalEvent::Resolved {
            request_id: request.id,
            approval_type: request.approval_type,
            status: request.status,
            resolved_by: request.resolved_by,
            requested_by: request.requested_by,
        });

        let handlers = self
            .handlers
            .get(&request.approval_type)
            .map(|h| h.value().clone())
            .unwrap_or_default();

        for handler in handlers {
            let request = request.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { run_handler(handler.as_ref(), &request) });
                }
                Err(_) => run_handler(handler.as_ref(), &request),
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
