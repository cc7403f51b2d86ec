//! Application configuration management.
//!
//! Every field carries a serde default, so an empty configuration source
//! yields the standard approval policy and role catalog.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Approval workflow policy.
    #[serde(default)]
    pub approvals: ApprovalPolicyConfig,
    /// SLA/escalation scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Role catalog and legacy capability table.
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

/// SLA budget in hours for each request priority.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlaHoursConfig {
    /// Hours allowed for critical requests.
    #[serde(default = "default_sla_critical")]
    pub critical: u32,
    /// Hours allowed for high-priority requests.
    #[serde(default = "default_sla_high")]
    pub high: u32,
    /// Hours allowed for medium-priority requests.
    #[serde(default = "default_sla_medium")]
    pub medium: u32,
    /// Hours allowed for low-priority requests.
    #[serde(default = "default_sla_low")]
    pub low: u32,
}

fn default_sla_critical() -> u32 {
    4
}

fn default_sla_high() -> u32 {
    12
}

fn default_sla_medium() -> u32 {
    24
}

fn default_sla_low() -> u32 {
    72
}

impl Default for SlaHoursConfig {
    fn default() -> Self {
        Self {
            critical: default_sla_critical(),
            high: default_sla_high(),
            medium: default_sla_medium(),
            low: default_sla_low(),
        }
    }
}

/// Approval workflow policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApprovalPolicyConfig {
    /// SLA table per priority.
    #[serde(default)]
    pub sla_hours: SlaHoursConfig,
    /// Hours added to the deadline each time a request is escalated.
    #[serde(default = "default_escalation_grace_hours")]
    pub escalation_grace_hours: u32,
    /// Number of escalations allowed before an overdue request expires.
    #[serde(default = "default_max_escalation_levels")]
    pub max_escalation_levels: u32,
    /// Whether each escalation raises the request priority by one step.
    #[serde(default = "default_raise_priority")]
    pub raise_priority_on_escalation: bool,
    /// Financial amount at or above which two approvals are required.
    #[serde(default = "default_dual_control_threshold")]
    pub dual_control_threshold: Option<Decimal>,
    /// Maximum wait for a per-request lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_escalation_grace_hours() -> u32 {
    4
}

fn default_max_escalation_levels() -> u32 {
    3
}

fn default_raise_priority() -> bool {
    true
}

fn default_dual_control_threshold() -> Option<Decimal> {
    Some(Decimal::new(1_000_000, 0))
}

fn default_lock_timeout_ms() -> u64 {
    500
}

impl Default for ApprovalPolicyConfig {
    fn default() -> Self {
        Self {
            sla_hours: SlaHoursConfig::default(),
            escalation_grace_hours: default_escalation_grace_hours(),
            max_escalation_levels: default_max_escalation_levels(),
            raise_priority_on_escalation: default_raise_priority(),
            dual_control_threshold: default_dual_control_threshold(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// SLA/escalation scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the background scan runs at all.
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Seconds between scans.
    #[serde(default = "default_scheduler_interval")]
    pub interval_secs: u64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_scheduler_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            interval_secs: default_scheduler_interval(),
        }
    }
}

/// A role definition as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleConfig {
    /// Role name (unique, case-insensitive).
    pub name: String,
    /// Authority level; lower numbers carry more authority.
    pub level: i32,
    /// Fine-grained `module:action` permissions.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Owner roles bypass every permission check.
    #[serde(default)]
    pub is_owner_role: bool,
}

impl RoleConfig {
    fn new(name: &str, level: i32, permissions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            level,
            permissions: permissions.iter().map(ToString::to_string).collect(),
            is_owner_role: false,
        }
    }
}

/// Role catalog and legacy capability table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PermissionsConfig {
    /// Roles known to the system.
    #[serde(default = "default_roles")]
    pub roles: Vec<RoleConfig>,
    /// Coarse capability name to fine-grained permissions.
    #[serde(default = "default_capabilities")]
    pub capabilities: BTreeMap<String, Vec<String>>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            capabilities: default_capabilities(),
        }
    }
}

fn default_roles() -> Vec<RoleConfig> {
    let mut owner = RoleConfig::new("owner", 0, &[]);
    owner.is_owner_role = true;

    vec![
        owner,
        RoleConfig::new(
            "admin",
            1,
            &[
                "approvals:read",
                "approvals:create",
                "approvals:approve",
                "users:manage",
                "roles:manage",
                "projects:read",
                "projects:write",
                "sales:read",
                "sales:write",
                "leads:read",
                "leads:write",
                "pricing:read",
                "pricing:write",
                "invoices:read",
                "invoices:write",
                "commissions:read",
                "commissions:write",
            ],
        ),
        RoleConfig::new(
            "sales_director",
            2,
            &[
                "approvals:read",
                "approvals:create",
                "approvals:approve",
                "projects:read",
                "sales:read",
                "sales:write",
                "leads:read",
                "leads:write",
                "pricing:read",
                "pricing:write",
                "commissions:read",
            ],
        ),
        RoleConfig::new(
            "finance_manager",
            2,
            &[
                "approvals:read",
                "approvals:approve",
                "invoices:read",
                "invoices:write",
                "payments:read",
                "payments:write",
                "commissions:read",
                "commissions:write",
            ],
        ),
        RoleConfig::new(
            "sales_manager",
            3,
            &[
                "approvals:read",
                "approvals:create",
                "approvals:approve",
                "projects:read",
                "sales:read",
                "sales:write",
                "leads:read",
                "leads:write",
                "pricing:read",
            ],
        ),
        RoleConfig::new(
            "sales_executive",
            4,
            &[
                "approvals:read",
                "approvals:create",
                "projects:read",
                "sales:read",
                "sales:write",
                "leads:read",
                "leads:write",
            ],
        ),
        RoleConfig::new(
            "viewer",
            5,
            &["approvals:read", "projects:read", "sales:read", "leads:read"],
        ),
    ]
}

fn default_capabilities() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 6] = [
        (
            "salesPipeline",
            &["leads:read", "leads:write", "sales:read", "sales:write"],
        ),
        (
            "inventoryManagement",
            &[
                "projects:read",
                "projects:write",
                "units:read",
                "units:write",
                "towers:read",
                "towers:write",
            ],
        ),
        ("pricingControl", &["pricing:read", "pricing:write"]),
        (
            "financeDesk",
            &[
                "invoices:read",
                "invoices:write",
                "payments:read",
                "commissions:read",
            ],
        ),
        ("approvalsDesk", &["approvals:read", "approvals:approve"]),
        ("administration", &["users:manage", "roles:manage"]),
    ];

    table
        .into_iter()
        .map(|(name, perms)| {
            (
                name.to_string(),
                perms.iter().map(ToString::to_string).collect(),
            )
        })
        .collect()
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
    /// and `KEYHOLD__`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("KEYHOLD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
