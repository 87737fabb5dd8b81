//! WorkOrder — immutable input to the core.

use super::ids::{WorkOrderId, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network/path policy attached to a work order. Enforced by external
/// collaborators (sandbox, workspace provisioner); the core only carries
/// and persists it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Policies {
    pub network_allowed: bool,
    #[serde(default)]
    pub forbidden_path_patterns: Vec<String>,
}

/// Which billing/agent variant a work order should run under. Affects
/// environment sanitization in the Streaming Subprocess Executor (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    Subscription,
    ApiKey,
}

/// Opaque verification-gate plan. The core never interprets its contents;
/// it is handed verbatim to the external `Verifier`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatePlan(pub serde_json::Value);

/// Opaque workspace source descriptor. Handed verbatim to the external
/// `WorkspaceProvisioner`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkspaceSource(pub serde_json::Value);

/// Input to the core. Immutable once accepted (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub workspace_id: WorkspaceId,
    pub task_prompt: String,
    pub workspace_source: WorkspaceSource,
    pub gate_plan: GatePlan,
    pub policies: Policies,
    pub max_iterations: u32,
    #[serde(with = "humantime_serde")]
    pub wall_clock_budget: Duration,
    pub billing_mode: BillingMode,
    /// Whether a passing run should open a PR and await CI (PR_CREATED /
    /// CI_POLLING path) rather than terminate at VERIFY_PASSED directly.
    #[serde(default)]
    pub wants_pr: bool,
    #[serde(default)]
    pub ci_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_order_round_trips_through_json() {
        let wo = WorkOrder {
            id: WorkOrderId::new(),
            workspace_id: WorkspaceId::new(),
            task_prompt: "fix the bug".into(),
            workspace_source: WorkspaceSource(serde_json::json!({"repo": "x"})),
            gate_plan: GatePlan(serde_json::json!({"levels": ["l0", "l1"]})),
            policies: Policies {
                network_allowed: false,
                forbidden_path_patterns: vec!["**/.env".into()],
            },
            max_iterations: 3,
            wall_clock_budget: Duration::from_secs(3600),
            billing_mode: BillingMode::Subscription,
            wants_pr: true,
            ci_enabled: true,
        };
        let json = serde_json::to_string(&wo).unwrap();
        let back: WorkOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, wo.id);
        assert_eq!(back.max_iterations, 3);
        assert!(back.wants_pr);
    }
}
