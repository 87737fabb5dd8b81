//! External collaborator traits (§4.8 and the Non-goals list): concrete
//! agent drivers, verifiers, snapshotters, workspace provisioners and
//! feedback generators are explicitly out of scope for this crate. It
//! defines the seams and drives them; it never implements one itself.
//! Grounded on `abstractions/`'s trait-per-external-dependency split and
//! `testing/mocks/`'s fake-per-trait convention (see `testing::mocks`).

use crate::model::{AgentResult, GatePlan, RunId, Snapshot, VerificationReport, WorkOrder, WorkspaceSource};
use async_trait::async_trait;
use std::path::PathBuf;

/// Provisions a workspace (checkout, container, sandbox — whatever the
/// deployment chooses) for a work order and tears it down afterward.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    async fn provision(&self, source: &WorkspaceSource) -> anyhow::Result<PathBuf>;
    async fn teardown(&self, path: &std::path::Path) -> anyhow::Result<()>;
}

/// Runs the agent child process against a provisioned workspace for one
/// iteration and returns its result. Implementations own spawning; the
/// core's `subprocess` module is available to them but not mandated.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    async fn run_iteration(
        &self,
        work_order: &WorkOrder,
        workspace: &std::path::Path,
        run_id: RunId,
        iteration: u32,
    ) -> anyhow::Result<AgentResult>;
}

/// Takes a point-in-time snapshot of a workspace (commit, tarball,
/// filesystem clone — implementation's choice) for later inspection or
/// PR creation.
#[async_trait]
pub trait Snapshotter: Send + Sync {
    async fn snapshot(&self, workspace: &std::path::Path) -> anyhow::Result<Snapshot>;
}

/// Runs a work order's gate plan against a snapshot and reports pass/
/// fail per level.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, plan: &GatePlan, snapshot: &Snapshot) -> anyhow::Result<VerificationReport>;
}

/// Turns a failed or partially-accepted iteration into feedback text fed
/// back into the next iteration's prompt.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(
        &self,
        work_order: &WorkOrder,
        last_agent_output: &str,
        verification: Option<&VerificationReport>,
    ) -> anyhow::Result<String>;
}

/// Outcome of one CI poll (§4.7 pseudocode: `CIMonitor.wait(ref)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiPollResult {
    pub all_passed: bool,
    pub timed_out: bool,
}

/// Waits on a CI check suite for a previously opened PR/ref. External and
/// retryable via the Retry Policy Engine, same as the other collaborators
/// in this module — not named in spec §6's interface list verbatim, but
/// referenced directly by §4.7's `CIMonitor.wait(ref)` pseudocode as the
/// thing that makes the `CI_POLLING` phase's `CI_PASSED`/`CI_FAILED`/
/// `CI_TIMEOUT` events reachable.
#[async_trait]
pub trait CiMonitor: Send + Sync {
    async fn wait(&self, ci_ref: &str) -> anyhow::Result<CiPollResult>;
}
