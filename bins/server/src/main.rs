//! Keyhold approval service
//!
//! Loads configuration, builds the permission model and approval engine,
//! and runs the SLA escalation scheduler until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyhold_core::approval::{
    ApprovalEngine, ApprovalPolicy, ApprovalRequest, ApprovalType, DispatchError,
    EscalationScheduler, TracingNotifier,
};
use keyhold_core::permission::PermissionModel;
use keyhold_shared::AppConfig;

fn log_resolution(request: &ApprovalRequest) -> Result<(), DispatchError> {
    info!(
        request_id = %request.id,
        request_number = %request.request_number,
        approval_type = %request.approval_type,
        status = %request.status,
        "Approval request resolved"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyhold=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let permissions = PermissionModel::from_config(&config.permissions)
        .context("Invalid role catalog in configuration")?;
    info!(
        roles = permissions.catalog().len(),
        capabilities = permissions.capabilities().names().count(),
        "Permission model loaded"
    );
    for role in permissions.catalog().roles_by_authority() {
        debug!(
            role = %role.name,
            level = role.level,
            owner = role.is_owner_role,
            permissions = role.permissions.len(),
            "Role registered"
        );
    }

    let policy = ApprovalPolicy::from_config(&config.approvals);
    let engine = Arc::new(
        ApprovalEngine::new(Arc::new(permissions), policy).with_notifier(Arc::new(TracingNotifier)),
    );
    for approval_type in ApprovalType::ALL {
        engine.register_resolution_handler(approval_type, Arc::new(log_resolution));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.scheduler.enabled {
        let scheduler = EscalationScheduler::from_config(Arc::clone(&engine), &config.scheduler);
        Some(scheduler.spawn(shutdown_rx))
    } else {
        info!("Escalation scheduler disabled");
        None
    };

    info!("Keyhold approval service running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    shutdown_tx.send(true).ok();
    if let Some(handle) = scheduler {
        handle.await.context("Scheduler task panicked")?;
    }

    Ok(())
}
