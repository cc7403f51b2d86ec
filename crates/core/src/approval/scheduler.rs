//! Periodic SLA scan that drives escalation and expiry.

use std::sync::Arc;
use std::time::Duration;

use keyhold_shared::SchedulerConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::engine::{ApprovalEngine, EscalationOutcome};
use super::error::ErrorKind;

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Overdue requests found.
    pub scanned: usize,
    /// Requests escalated.
    pub escalated: usize,
    /// Requests expired.
    pub expired: usize,
    /// Requests that needed nothing by the time they were processed.
    pub skipped: usize,
    /// Requests whose escalation failed.
    pub failed: usize,
}

/// Background task scanning for overdue requests.
pub struct EscalationScheduler {
    engine: Arc<ApprovalEngine>,
    interval: Duration,
}

impl EscalationScheduler {
    /// Creates a scheduler scanning every `interval`.
    #[must_use]
    pub fn new(engine: Arc<ApprovalEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Creates a scheduler from the `scheduler` configuration section.
    #[must_use]
    pub fn from_config(engine: Arc<ApprovalEngine>, config: &SchedulerConfig) -> Self {
        Self::new(engine, Duration::from_secs(config.interval_secs.max(1)))
    }

    /// Scan interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs a single scan. One request's failure never stops the others.
    pub async fn run_once(&self) -> ScanReport {
        let overdue = self.engine.overdue_request_ids();
        let mut report = ScanReport {
            scanned: overdue.len(),
            ..ScanReport::default()
        };

        for request_id in overdue {
            match self.engine.escalate(request_id).await {
                Ok(EscalationOutcome::Escalated { .. }) => report.escalated += 1,
                Ok(EscalationOutcome::Expired) => report.expired += 1,
                Ok(EscalationOutcome::NotDue | EscalationOutcome::AlreadyEscalated) => {
                    report.skipped += 1;
                }
                // Resolved or deleted between listing and locking.
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::InvalidState | ErrorKind::Expired | ErrorKind::NotFound
                    ) =>
                {
                    report.skipped += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        error_code = e.error_code(),
                        "Escalation failed"
                    );
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                escalated = report.escalated,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "SLA scan complete"
            );
        }

        report
    }

    /// Runs scans on the interval until `shutdown` turns true or its
    /// sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "Escalation scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Escalation scheduler stopped");
        })
    }
}
