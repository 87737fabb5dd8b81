//! Fake implementations of every `external` trait, grounded on
//! `testing/mocks/`'s one-fake-per-trait convention. Each fake is
//! configured by constructor and records nothing beyond what its tests
//! need — they exist to make the Run Executor testable without a real
//! agent, git host, or sandbox.

use crate::external::{AgentDriver, CiMonitor, CiPollResult, FeedbackGenerator, Snapshotter, Verifier, WorkspaceProvisioner};
use crate::model::{AgentResult, GatePlan, LevelResult, RunId, Snapshot, VerificationReport, WorkOrder, WorkspaceSource};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeWorkspaceProvisioner {
    pub root: PathBuf,
}

#[async_trait]
impl WorkspaceProvisioner for FakeWorkspaceProvisioner {
    async fn provision(&self, _source: &WorkspaceSource) -> anyhow::Result<PathBuf> {
        Ok(self.root.clone())
    }

    async fn teardown(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Returns a scripted sequence of results, one per call, repeating the
/// last entry once exhausted. Lets a test drive a multi-iteration loop
/// without a real agent.
pub struct FakeAgentDriver {
    scripted: Mutex<Vec<AgentResult>>,
    calls: AtomicU32,
}

impl FakeAgentDriver {
    pub fn new(scripted: Vec<AgentResult>) -> Self {
        Self { scripted: Mutex::new(scripted), calls: AtomicU32::new(0) }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AgentDriver for FakeAgentDriver {
    async fn run_iteration(
        &self,
        _work_order: &WorkOrder,
        _workspace: &Path,
        _run_id: RunId,
        iteration: u32,
    ) -> anyhow::Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self.scripted.lock().unwrap();
        let idx = (iteration as usize).min(scripted.len().saturating_sub(1));
        Ok(scripted[idx].clone())
    }
}

/// Always reports a clean build, an unchanged `after_sha` each call
/// (callers that need loop-detection coverage should use
/// [`FakeSnapshotter::changing`]).
pub struct FakeSnapshotter {
    pub after_sha: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl FakeSnapshotter {
    pub fn new() -> Self {
        Self { after_sha: Mutex::new(vec!["sha-fixed".into()]), calls: AtomicU32::new(0) }
    }

    /// Returns a different `after_sha` per call, in order, repeating the
    /// last one once exhausted — use when a test needs distinct
    /// content hashes across iterations.
    pub fn changing(shas: Vec<&str>) -> Self {
        Self { after_sha: Mutex::new(shas.into_iter().map(String::from).collect()), calls: AtomicU32::new(0) }
    }
}

impl Default for FakeSnapshotter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Snapshotter for FakeSnapshotter {
    async fn snapshot(&self, _workspace: &Path) -> anyhow::Result<Snapshot> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) as usize;
        let shas = self.after_sha.lock().unwrap();
        let sha = shas[call.min(shas.len().saturating_sub(1))].clone();
        Ok(Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: RunId::new(),
            iteration: call as u32,
            before_sha: "sha-before".into(),
            after_sha: sha,
            branch: None,
            commit_message: None,
            patch_path: None,
            files_changed: 1,
            insertions: 1,
            deletions: 0,
        })
    }
}

/// Always returns the same verdict, configured at construction.
pub struct FakeVerifier {
    pub passed: bool,
}

#[async_trait]
impl Verifier for FakeVerifier {
    async fn verify(&self, _plan: &GatePlan, snapshot: &Snapshot) -> anyhow::Result<VerificationReport> {
        let level = LevelResult { passed: self.passed, checks: vec!["l0".into()], duration: Duration::ZERO };
        Ok(VerificationReport {
            id: uuid::Uuid::new_v4().to_string(),
            snapshot_id: snapshot.id.clone(),
            passed: self.passed,
            l0: level.clone(),
            l1: if self.passed { level.clone() } else { LevelResult::skipped() },
            l2: if self.passed { level.clone() } else { LevelResult::skipped() },
            l3: if self.passed { level } else { LevelResult::skipped() },
            diagnostics: if self.passed { vec![] } else { vec!["l0 failed".into()] },
            logs: String::new(),
            total_duration: Duration::ZERO,
        })
    }
}

pub struct FakeFeedbackGenerator;

#[async_trait]
impl FeedbackGenerator for FakeFeedbackGenerator {
    async fn generate(
        &self,
        _work_order: &WorkOrder,
        last_agent_output: &str,
        _verification: Option<&VerificationReport>,
    ) -> anyhow::Result<String> {
        Ok(format!("previous attempt said: {last_agent_output}"))
    }
}

/// Always reports the same CI outcome, configured at construction.
pub struct FakeCiMonitor {
    pub result: CiPollResult,
}

impl FakeCiMonitor {
    pub fn passed() -> Self {
        Self { result: CiPollResult { all_passed: true, timed_out: false } }
    }

    pub fn failed() -> Self {
        Self { result: CiPollResult { all_passed: false, timed_out: false } }
    }

    pub fn timed_out() -> Self {
        Self { result: CiPollResult { all_passed: false, timed_out: true } }
    }
}

#[async_trait]
impl CiMonitor for FakeCiMonitor {
    async fn wait(&self, _ci_ref: &str) -> anyhow::Result<CiPollResult> {
        Ok(self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(output: &str) -> AgentResult {
        AgentResult {
            exit_code: Some(0),
            timed_out: false,
            tool_call_count: 1,
            agent_output: output.into(),
            stderr_tail: String::new(),
            stdout_truncated: false,
        }
    }

    #[tokio::test]
    async fn fake_agent_driver_plays_back_script() {
        let driver = FakeAgentDriver::new(vec![result("first"), result("second")]);
        let wo = crate::model::WorkOrder {
            id: crate::model::WorkOrderId::new(),
            workspace_id: crate::model::WorkspaceId::new(),
            task_prompt: "x".into(),
            workspace_source: WorkspaceSource::default(),
            gate_plan: GatePlan::default(),
            policies: crate::model::Policies::default(),
            max_iterations: 2,
            wall_clock_budget: std::time::Duration::from_secs(1),
            billing_mode: crate::model::BillingMode::ApiKey,
            wants_pr: false,
            ci_enabled: false,
        };
        let run_id = RunId::new();
        let r0 = driver.run_iteration(&wo, Path::new("/tmp"), run_id, 0).await.unwrap();
        let r1 = driver.run_iteration(&wo, Path::new("/tmp"), run_id, 1).await.unwrap();
        assert_eq!(r0.agent_output, "first");
        assert_eq!(r1.agent_output, "second");
        assert_eq!(driver.call_count(), 2);
    }

    #[tokio::test]
    async fn fake_snapshotter_changing_cycles_through_shas() {
        let snap = FakeSnapshotter::changing(vec!["a", "b"]);
        let s0 = snap.snapshot(Path::new("/tmp")).await.unwrap();
        let s1 = snap.snapshot(Path::new("/tmp")).await.unwrap();
        let s2 = snap.snapshot(Path::new("/tmp")).await.unwrap();
        assert_eq!(s0.after_sha, "a");
        assert_eq!(s1.after_sha, "b");
        assert_eq!(s2.after_sha, "b");
    }
}
