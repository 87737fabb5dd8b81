//! Streaming Subprocess Executor and Stream Parser (§4.3/§4.4,
//! components C3/C4), plus the process registry that lets the Run
//! Executor cancel a live agent child.

pub mod driver;
pub mod executor;
pub mod parser;
pub mod registry;
pub mod types;

pub use driver::SubprocessAgentDriver;
pub use executor::{StreamingSubprocessExecutor, SubprocessSpec};
pub use parser::{parse_line, ParsedEvent};
pub use registry::{ProcessKey, ProcessRegistry};
pub use types::{ProgressTicker, RawAgentLine};

use crate::model::{BillingMode, WorkOrder};

/// Build the environment for an agent child process per §4.4's
/// subscription-billing sanitization rule: strip API-key variables and
/// force non-interactive, colorless output.
pub fn sanitized_env(work_order: &WorkOrder, base: &[(String, String)]) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = base.to_vec();
    if work_order.billing_mode == BillingMode::Subscription {
        const STRIP: &[&str] = &[
            "ANTHROPIC_API_KEY",
            "CLAUDE_API_KEY",
            "ANTHROPIC_API_BASE",
            "ANTHROPIC_BASE_URL",
        ];
        env.retain(|(k, _)| !STRIP.contains(&k.as_str()));
        env.push(("NO_COLOR".into(), "1".into()));
        env.push(("FORCE_COLOR".into(), "0".into()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GatePlan, Policies, WorkOrderId, WorkspaceId, WorkspaceSource};
    use std::time::Duration;

    fn work_order(billing_mode: BillingMode) -> WorkOrder {
        WorkOrder {
            id: WorkOrderId::new(),
            workspace_id: WorkspaceId::new(),
            task_prompt: "x".into(),
            workspace_source: WorkspaceSource::default(),
            gate_plan: GatePlan::default(),
            policies: Policies::default(),
            max_iterations: 1,
            wall_clock_budget: Duration::from_secs(1),
            billing_mode,
            wants_pr: false,
            ci_enabled: false,
        }
    }

    #[test]
    fn subscription_mode_strips_api_keys_and_forces_no_color() {
        let wo = work_order(BillingMode::Subscription);
        let base = vec![("ANTHROPIC_API_KEY".into(), "sk-xyz".into()), ("PATH".into(), "/usr/bin".into())];
        let env = sanitized_env(&wo, &base);
        assert!(!env.iter().any(|(k, _)| k == "ANTHROPIC_API_KEY"));
        assert!(env.iter().any(|(k, v)| k == "NO_COLOR" && v == "1"));
        assert!(env.iter().any(|(k, _)| k == "PATH"));
    }

    #[test]
    fn api_key_mode_leaves_env_untouched() {
        let wo = work_order(BillingMode::ApiKey);
        let base = vec![("ANTHROPIC_API_KEY".into(), "sk-xyz".into())];
        let env = sanitized_env(&wo, &base);
        assert!(env.iter().any(|(k, _)| k == "ANTHROPIC_API_KEY"));
        assert!(!env.iter().any(|(k, _)| k == "NO_COLOR"));
    }
}
