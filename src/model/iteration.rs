//! Per-iteration records persisted under `<root>/runs/<run-id>/` as a
//! split `agent-<n>.json` / `verification-<n>.json` pair (§5 persistence
//! layout; split chosen per SPEC_FULL.md §9 Open Question 3).

use super::ids::RunId;
use crate::error::GateErrorKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one streaming subprocess invocation (§4.3/§4.4), handed
/// back to the Run Executor and fed to the active Loop Strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub tool_call_count: u32,
    /// Canonical agent output for this iteration: every `output` event's
    /// content, in emission order, newline-joined (SPEC_FULL.md §9 Open
    /// Question 1). Consumed by both Hybrid's signal check and Ralph's
    /// similarity check.
    pub agent_output: String,
    /// Tail of stderr retained in the ring buffer (§4.3).
    pub stderr_tail: String,
    pub stdout_truncated: bool,
}

impl AgentResult {
    /// A build is successful iff the agent exited zero and did not time
    /// out — anything else is a `BUILD_FAILED` transition (§4.1).
    pub fn build_succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// One tiered verification gate's outcome (§6: `LevelResult{passed,
/// checks[], duration}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelResult {
    pub passed: bool,
    pub checks: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl LevelResult {
    pub fn skipped() -> Self {
        Self {
            passed: true,
            checks: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

/// Result of running a work order's gate plan against a snapshot (§4.8,
/// §6, external `Verifier`). The four levels are always present —
/// gates not configured for a given work order report as `skipped()`
/// (`passed = true`, no checks) so the content-hash tuple in §4.5 stays
/// well-defined regardless of which levels a plan actually enables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub id: String,
    pub snapshot_id: String,
    pub passed: bool,
    pub l0: LevelResult,
    pub l1: LevelResult,
    pub l2: LevelResult,
    pub l3: LevelResult,
    pub diagnostics: Vec<String>,
    pub logs: String,
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
}

impl VerificationReport {
    /// Highest level (0-3) that reported `passed`, or `None` if l0 itself
    /// failed. Feeds Hybrid's max-iterations `partial_accept` gate (§4.5).
    pub fn highest_level_passed(&self) -> Option<u8> {
        let levels = [&self.l0, &self.l1, &self.l2, &self.l3];
        let mut highest = None;
        for (i, level) in levels.iter().enumerate() {
            if level.passed {
                highest = Some(i as u8);
            } else {
                break;
            }
        }
        highest
    }
}

/// Opaque snapshot reference returned by the external `Snapshotter`
/// (§6), stored inline on the iteration record that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub run_id: RunId,
    pub iteration: u32,
    pub before_sha: String,
    pub after_sha: String,
    pub branch: Option<String>,
    pub commit_message: Option<String>,
    pub patch_path: Option<PathBuf>,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

/// One full iteration of the BUILDING -> SNAPSHOTTING -> VERIFYING cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub run_id: RunId,
    pub iteration: u32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub agent_result: Option<AgentResult>,
    pub snapshot: Option<Snapshot>,
    pub verification: Option<VerificationReport>,
    /// First 16 hex chars of the SHA-256 of the canonical tuple
    /// `(after_sha, l0.passed, l1.passed, l2.passed, l3.passed,
    /// diagnostics.len())` (§4.5), recorded for the Hybrid strategy's
    /// content-hash loop detector even when a different strategy is
    /// active, so switching strategies mid-run never loses history.
    pub content_hash: Option<String>,
    pub error: Option<(GateErrorKind, String)>,
}

impl IterationRecord {
    pub fn new(run_id: RunId, iteration: u32) -> Self {
        Self {
            run_id,
            iteration,
            started_at: chrono::Utc::now(),
            ended_at: None,
            agent_result: None,
            snapshot: None,
            verification: None,
            content_hash: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_iteration_record_has_no_outcome_yet() {
        let rec = IterationRecord::new(RunId::new(), 0);
        assert!(rec.ended_at.is_none());
        assert!(rec.agent_result.is_none());
        assert!(rec.verification.is_none());
    }

    #[test]
    fn build_failure_covers_nonzero_exit_and_timeout() {
        let ok = AgentResult {
            exit_code: Some(0),
            timed_out: false,
            tool_call_count: 1,
            agent_output: String::new(),
            stderr_tail: String::new(),
            stdout_truncated: false,
        };
        assert!(ok.build_succeeded());

        let mut timed_out = ok.clone();
        timed_out.timed_out = true;
        assert!(!timed_out.build_succeeded());

        let mut crashed = ok.clone();
        crashed.exit_code = Some(1);
        assert!(!crashed.build_succeeded());
    }

    #[test]
    fn highest_level_passed_stops_at_first_failure() {
        let report = VerificationReport {
            id: "v1".into(),
            snapshot_id: "s1".into(),
            passed: false,
            l0: LevelResult { passed: true, checks: vec![], duration: Duration::ZERO },
            l1: LevelResult { passed: true, checks: vec![], duration: Duration::ZERO },
            l2: LevelResult { passed: false, checks: vec![], duration: Duration::ZERO },
            l3: LevelResult { passed: true, checks: vec![], duration: Duration::ZERO },
            diagnostics: vec!["l2 failed".into()],
            logs: String::new(),
            total_duration: Duration::ZERO,
        };
        assert_eq!(report.highest_level_passed(), Some(1));
    }
}
