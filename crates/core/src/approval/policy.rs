//! SLA, escalation and dual-control policy.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use keyhold_shared::ApprovalPolicyConfig;
use rust_decimal::Decimal;

use super::request_data::RequestData;
use super::types::Priority;

fn saturating_add(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Runtime approval policy, built from [`ApprovalPolicyConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    sla_critical: TimeDelta,
    sla_high: TimeDelta,
    sla_medium: TimeDelta,
    sla_low: TimeDelta,
    escalation_grace: TimeDelta,
    max_escalation_levels: u32,
    raise_priority_on_escalation: bool,
    dual_control_threshold: Option<Decimal>,
    lock_timeout: Duration,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::from_config(&ApprovalPolicyConfig::default())
    }
}

impl ApprovalPolicy {
    /// Builds the policy from the `approvals` configuration section.
    #[must_use]
    pub fn from_config(config: &ApprovalPolicyConfig) -> Self {
        let hours = |h: u32| TimeDelta::try_hours(i64::from(h)).unwrap_or(TimeDelta::MAX);
        Self {
            sla_critical: hours(config.sla_hours.critical),
            sla_high: hours(config.sla_hours.high),
            sla_medium: hours(config.sla_hours.medium),
            sla_low: hours(config.sla_hours.low),
            escalation_grace: hours(config.escalation_grace_hours),
            max_escalation_levels: config.max_escalation_levels,
            raise_priority_on_escalation: config.raise_priority_on_escalation,
            dual_control_threshold: config.dual_control_threshold,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    /// SLA budget for a priority.
    #[must_use]
    pub fn sla_for(&self, priority: Priority) -> TimeDelta {
        match priority {
            Priority::Critical => self.sla_critical,
            Priority::High => self.sla_high,
            Priority::Medium => self.sla_medium,
            Priority::Low => self.sla_low,
        }
    }

    /// Deadline for a request created at `now`.
    ///
    /// Saturates at the latest representable instant.
    #[must_use]
    pub fn deadline_for(&self, priority: Priority, now: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(now, self.sla_for(priority))
    }

    /// Deadline after escalating a request that breached `breached`,
    /// never earlier than `now`.
    #[must_use]
    pub fn escalated_deadline(&self, breached: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(breached, self.escalation_grace).max(now)
    }

    /// Minimum approvals the policy mandates for a payload.
    ///
    /// Two when the financial amount reaches the dual-control threshold,
    /// otherwise one.
    #[must_use]
    pub fn required_approvals_for(&self, data: &RequestData) -> u32 {
        match (self.dual_control_threshold, data.financial_amount()) {
            (Some(threshold), Some(amount)) if amount >= threshold => 2,
            _ => 1,
        }
    }

    /// Time added to the deadline per escalation.
    #[must_use]
    pub fn escalation_grace(&self) -> TimeDelta {
        self.escalation_grace
    }

    /// Escalations allowed before an overdue request expires.
    #[must_use]
    pub fn max_escalation_levels(&self) -> u32 {
        self.max_escalation_levels
    }

    /// Whether escalation raises priority.
    #[must_use]
    pub fn raise_priority_on_escalation(&self) -> bool {
        self.raise_priority_on_escalation
    }

    /// Maximum wait for a per-request lock.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Overrides the SLA for one priority.
    #[must_use]
    pub fn with_sla(mut self, priority: Priority, sla: TimeDelta) -> Self {
        match priority {
            Priority::Critical => self.sla_critical = sla,
            Priority::High => self.sla_high = sla,
            Priority::Medium => self.sla_medium = sla,
            Priority::Low => self.sla_low = sla,
        }
        self
    }

    /// Overrides the escalation grace period.
    #[must_use]
    pub fn with_escalation_grace(mut self, grace: TimeDelta) -> Self {
        self.escalation_grace = grace;
        self
    }

    /// Overrides the number of escalation levels.
    #[must_use]
    pub fn with_max_escalation_levels(mut self, levels: u32) -> Self {
        self.max_escalation_levels = levels;
        self
    }

    /// Overrides the priority raise flag.
    #[must_use]
    pub fn with_raise_priority_on_escalation(mut self, raise: bool) -> Self {
        self.raise_priority_on_escalation = raise;
        self
    }

    /// Overrides the dual-control threshold; `None` disables it.
    #[must_use]
    pub fn with_dual_control_threshold(mut self, threshold: Option<Decimal>) -> Self {
        self.dual_control_threshold = threshold;
        self
    }

    /// Overrides the lock wait.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}
