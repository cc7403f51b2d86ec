//! Property-based tests for ApprovalEngine.
//!
//! Operations are generated as random sequences and replayed against a
//! fresh engine on a single-threaded runtime.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use keyhold_shared::types::{ApprovalRequestId, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::approval::clock::ManualClock;
use crate::approval::engine::ApprovalEngine;
use crate::approval::error::{ApprovalError, ErrorKind};
use crate::approval::policy::ApprovalPolicy;
use crate::approval::request_data::{CommissionPayoutData, RequestData};
use crate::approval::types::{ApprovalStatus, EntityRef, NewApprovalRequest};
use crate::permission::{PermissionModel, Subject, perms};

#[derive(Debug, Clone)]
enum Op {
    Approve(usize),
    Reject(usize),
    Cancel,
    ForeignCancel,
    Escalate { hours: i64 },
}

fn arb_op(approvers: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..approvers).prop_map(Op::Approve),
        (0..approvers).prop_map(Op::Reject),
        Just(Op::Cancel),
        Just(Op::ForeignCancel),
        (0i64..200).prop_map(|hours| Op::Escalate { hours }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

struct Setup {
    engine: ApprovalEngine,
    clock: Arc<ManualClock>,
    requester: Subject,
    approvers: Vec<Subject>,
}

fn setup(approver_count: usize, policy: ApprovalPolicy) -> Setup {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = ApprovalEngine::new(Arc::new(PermissionModel::default()), policy)
        .with_clock(clock.clone());
    let approvers = (0..approver_count)
        .map(|i| {
            let level = i32::try_from(i % 3).unwrap() + 1;
            Subject::new(UserId::new(), level, [perms::APPROVALS_APPROVE])
        })
        .collect();

    Setup {
        engine,
        clock,
        requester: Subject::new(UserId::new(), 4, ["approvals:create"]),
        approvers,
    }
}

fn payout(setup: &Setup, required: Option<u32>) -> NewApprovalRequest {
    let mut input = NewApprovalRequest::new(
        RequestData::CommissionPayout(CommissionPayoutData {
            amount: Decimal::new(75_000, 2),
            payee: "Harbor Realty".to_string(),
        }),
        setup.requester.user_id,
        EntityRef::new("commission", Uuid::nil()),
        setup.approvers.clone(),
    );
    input.required_approvals = required;
    input
}

async fn apply(setup: &Setup, id: ApprovalRequestId, op: &Op) -> Result<(), ApprovalError> {
    match op {
        Op::Approve(i) => setup
            .engine
            .approve(id, &setup.approvers[*i], None)
            .await
            .map(|_| ()),
        Op::Reject(i) => setup
            .engine
            .reject(id, &setup.approvers[*i], "not justified")
            .await
            .map(|_| ()),
        Op::Cancel => setup
            .engine
            .cancel(id, &setup.requester, None)
            .await
            .map(|_| ()),
        Op::ForeignCancel => setup
            .engine
            .cancel(id, &setup.approvers[0], None)
            .await
            .map(|_| ()),
        Op::Escalate { hours } => {
            setup.clock.advance(TimeDelta::hours(*hours));
            setup.engine.escalate(id).await.map(|_| ())
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Once a request is terminal, every later mutation fails and nothing
    /// about the stored request changes.
    #[test]
    fn prop_terminal_requests_are_immutable(
        ops in prop::collection::vec(arb_op(3), 1..24)
    ) {
        let setup = setup(3, ApprovalPolicy::default());
        let violations = runtime().block_on(async {
            let id = setup.engine.create_request(payout(&setup, Some(2))).unwrap().id;
            let mut violations = Vec::new();

            for op in &ops {
                let before = setup.engine.get_request(id).unwrap();
                let result = apply(&setup, id, op).await;
                let after = setup.engine.get_request(id).unwrap();

                if before.status.is_terminal() {
                    if result.is_ok() {
                        violations.push(format!("{op:?} succeeded on {}", before.status));
                    }
                    if before != after {
                        violations.push(format!("{op:?} modified a {} request", before.status));
                    }
                }
            }
            violations
        });

        prop_assert!(violations.is_empty(), "{:?}", violations);
    }

    /// Audit trail only grows, and escalation levels only increase.
    #[test]
    fn prop_history_is_append_only(
        ops in prop::collection::vec(arb_op(3), 1..24)
    ) {
        let setup = setup(3, ApprovalPolicy::default());
        let ok = runtime().block_on(async {
            let id = setup.engine.create_request(payout(&setup, Some(3))).unwrap().id;
            let mut previous = setup.engine.get_request(id).unwrap();

            for op in &ops {
                let _ = apply(&setup, id, op).await;
                let current = setup.engine.get_request(id).unwrap();

                let audit_prefix = current.audit_trail.entries()
                    .starts_with(previous.audit_trail.entries());
                let escalation_prefix = current.escalation_history
                    .starts_with(&previous.escalation_history);
                let levels_increase = current.escalation_history
                    .windows(2)
                    .all(|w| w[0].level < w[1].level);

                if !(audit_prefix && escalation_prefix && levels_increase) {
                    return false;
                }
                previous = current;
            }
            true
        });

        prop_assert!(ok);
    }

    /// Empty or whitespace-only rejection reasons always fail validation.
    #[test]
    fn prop_blank_rejection_reason_is_validation(reason in "[ \t\r\n]{0,12}") {
        let setup = setup(1, ApprovalPolicy::default());
        let err = runtime().block_on(async {
            let id = setup.engine.create_request(payout(&setup, None)).unwrap().id;
            setup.engine.reject(id, &setup.approvers[0], &reason).await.unwrap_err()
        });

        prop_assert_eq!(err.kind(), ErrorKind::Validation);
    }

    /// With k required approvals, k-1 approvals keep the request pending and
    /// the k-th approves it.
    #[test]
    fn prop_required_approvals_threshold(
        (n, k) in (1usize..6).prop_flat_map(|n| (Just(n), 1..=n))
    ) {
        let setup = setup(n, ApprovalPolicy::default());
        let statuses = runtime().block_on(async {
            let required = u32::try_from(k).unwrap();
            let id = setup.engine.create_request(payout(&setup, Some(required))).unwrap().id;

            let mut statuses = Vec::new();
            for approver in setup.approvers.iter().take(k) {
                let request = setup.engine.approve(id, approver, None).await.unwrap();
                statuses.push(request.status);
            }
            statuses
        });

        let (last, earlier) = statuses.split_last().unwrap();
        prop_assert_eq!(*last, ApprovalStatus::Approved);
        prop_assert!(earlier.iter().all(|s| *s == ApprovalStatus::Pending));
    }

    /// One approval and one rejection resolve as rejected in either order,
    /// with the second action failing if the rejection came first.
    #[test]
    fn prop_single_rejection_vetoes(reject_first in any::<bool>()) {
        let setup = setup(2, ApprovalPolicy::default());
        let (status, second) = runtime().block_on(async {
            let id = setup.engine.create_request(payout(&setup, Some(2))).unwrap().id;
            let (approver, rejecter) = (&setup.approvers[0], &setup.approvers[1]);

            let second = if reject_first {
                setup.engine.reject(id, rejecter, "over budget").await.unwrap();
                setup.engine.approve(id, approver, None).await.map(|_| ())
            } else {
                setup.engine.approve(id, approver, None).await.unwrap();
                setup.engine.reject(id, rejecter, "over budget").await.map(|_| ())
            };

            (setup.engine.get_request(id).unwrap().status, second)
        });

        prop_assert_eq!(status, ApprovalStatus::Rejected);
        prop_assert_eq!(second.is_ok(), !reject_first);
    }

    /// Repeating a scan at the same instant never records a second escalation.
    #[test]
    fn prop_escalation_is_idempotent_within_window(
        overdue_minutes in 1i64..600,
        grace_hours in 0i64..6,
    ) {
        let policy = ApprovalPolicy::default()
            .with_escalation_grace(TimeDelta::hours(grace_hours));
        let setup = setup(2, policy);
        let escalations = runtime().block_on(async {
            let id = setup.engine.create_request(payout(&setup, None)).unwrap().id;
            setup.clock.advance(TimeDelta::hours(24) + TimeDelta::minutes(overdue_minutes));

            let _ = setup.engine.escalate(id).await;
            let _ = setup.engine.escalate(id).await;
            setup.engine.get_request(id).unwrap().escalation_history.len()
        });

        prop_assert_eq!(escalations, 1);
    }
}
