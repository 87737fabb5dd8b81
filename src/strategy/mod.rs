//! Loop Strategy (§4.5, component C6): decides, after each iteration,
//! whether the Run Executor should drive another BUILDING pass or stop.
//! Three variants ship with the core (`Fixed`, `Hybrid`, `Ralph`);
//! grounded on the iterate-until-condition shape of `cook/goal_seek/`
//! and the capability-trait-with-variants pattern used across
//! `cook/orchestrator`.

pub mod fixed;
pub mod hybrid;
pub mod ralph;

pub use fixed::Fixed;
pub use hybrid::Hybrid;
pub use ralph::Ralph;

use crate::model::{Snapshot, VerificationReport};

/// Configurable completion criteria Hybrid can be asked to honor, beyond
/// the always-on max-iterations and loop-detection checks (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCriterion {
    VerificationPass,
    NoChanges,
    CiPass,
    AgentSignal,
}

/// What a strategy observed about one completed iteration, handed to it
/// by the Run Executor right after verification.
#[derive(Debug, Clone)]
pub struct IterationContext<'a> {
    pub iteration: u32,
    pub max_iterations: u32,
    pub agent_output: &'a str,
    pub content_hash: &'a str,
    pub verification_passed: bool,
    /// Whether the snapshot changed anything relative to the prior
    /// iteration — feeds the `NoChanges` completion criterion.
    pub no_changes: bool,
    /// Whether the PR's CI check suite passed — feeds `CiPass`. `false`
    /// when CI isn't part of this work order's flow.
    pub ci_passed: bool,
    /// Highest verification level (0-3) reached this iteration, or
    /// `None` if even L0 failed. Gates `partial_accept` on a
    /// max-iterations stop (§4.5: "any verification level was reached").
    pub highest_level_passed: Option<u8>,
}

/// Outcome of `should_continue`. `partial_accept` flags a stop that was
/// forced by loop detection or budget exhaustion rather than a clean
/// verification pass — the Run Executor surfaces this to feedback
/// generation so the caller knows the run didn't converge cleanly.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue,
    Stop { reason: String, partial_accept: bool },
}

impl Decision {
    pub fn stop(reason: impl Into<String>) -> Self {
        Decision::Stop { reason: reason.into(), partial_accept: false }
    }

    pub fn stop_partial(reason: impl Into<String>) -> Self {
        Decision::Stop { reason: reason.into(), partial_accept: true }
    }
}

/// Capability trait implemented by every loop strategy. Stateful methods
/// take `&mut self` since `Hybrid`/`Ralph` maintain sliding windows of
/// recent content hashes and outputs across iterations.
pub trait LoopStrategy: Send + Sync {
    fn initialize(&mut self) {}
    fn on_loop_start(&mut self) {}
    fn should_continue(&mut self, ctx: &IterationContext<'_>) -> Decision;
    fn on_iteration_end(&mut self, _ctx: &IterationContext<'_>) {}
    fn on_loop_end(&mut self) {}
    fn reset(&mut self);
}

/// 16-hex-char SHA-256 prefix of the canonical loop-detection tuple
/// `(afterSha, l0Pass, l1Pass, l2Pass, l3Pass, diagnosticCount)` (§4.5) —
/// the content hash recorded on every `IterationRecord` regardless of
/// which strategy is active. Hashing the verification outcome rather
/// than raw console text means two iterations that produced different
/// agent chatter but identical code-plus-verdict still collapse to the
/// same hash, which is what "loop detected" is supposed to mean.
pub fn content_hash(snapshot: &Snapshot, report: &VerificationReport) -> String {
    use sha2::{Digest, Sha256};
    let canonical = format!(
        "{}|{}|{}|{}|{}|{}",
        snapshot.after_sha,
        report.l0.passed,
        report.l1.passed,
        report.l2.passed,
        report.l3.passed,
        report.diagnostics.len()
    );
    let digest = Sha256::digest(canonical.as_bytes());
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        if out.len() >= chars {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(chars);
    out
}

static COMPLETION_SIGNAL: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
    regex::Regex::new(r"(?i)task_complete|task_completed|\[complete\]|done").unwrap()
});

/// Case-insensitive *containment* scan for the agent's self-reported
/// completion signal (§4.5: literal tokens `TASK_COMPLETE`,
/// `TASK_COMPLETED`, `[COMPLETE]`, `DONE`) against the canonical output
/// string (SPEC_FULL.md §9 Open Question 1). Deliberately not
/// word-bounded — the spec calls for substring containment, not a
/// tokenizer.
pub fn has_completion_signal(agent_output: &str) -> bool {
    COMPLETION_SIGNAL.is_match(agent_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LevelResult, RunId};
    use std::time::Duration;

    fn snapshot(after_sha: &str) -> Snapshot {
        Snapshot {
            id: "s1".into(),
            run_id: RunId::new(),
            iteration: 0,
            before_sha: "before".into(),
            after_sha: after_sha.into(),
            branch: None,
            commit_message: None,
            patch_path: None,
            files_changed: 1,
            insertions: 1,
            deletions: 0,
        }
    }

    fn report(l0: bool, diagnostics: usize) -> VerificationReport {
        VerificationReport {
            id: "v1".into(),
            snapshot_id: "s1".into(),
            passed: l0,
            l0: LevelResult { passed: l0, checks: vec![], duration: Duration::ZERO },
            l1: LevelResult { passed: true, checks: vec![], duration: Duration::ZERO },
            l2: LevelResult { passed: true, checks: vec![], duration: Duration::ZERO },
            l3: LevelResult { passed: true, checks: vec![], duration: Duration::ZERO },
            diagnostics: vec!["x".to_string(); diagnostics],
            logs: String::new(),
            total_duration: Duration::ZERO,
        }
    }

    #[test]
    fn content_hash_is_stable_and_16_chars() {
        let h1 = content_hash(&snapshot("abc"), &report(true, 0));
        let h2 = content_hash(&snapshot("abc"), &report(true, 0));
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn different_after_sha_hashes_differently() {
        assert_ne!(
            content_hash(&snapshot("abc"), &report(true, 0)),
            content_hash(&snapshot("def"), &report(true, 0))
        );
    }

    #[test]
    fn different_diagnostic_counts_hash_differently_even_with_same_sha() {
        assert_ne!(
            content_hash(&snapshot("abc"), &report(false, 0)),
            content_hash(&snapshot("abc"), &report(false, 2))
        );
    }

    #[test]
    fn completion_signal_is_case_insensitive_and_not_word_bounded() {
        assert!(has_completion_signal("all done. task_complete"));
        assert!(has_completion_signal("reached [complete] state"));
        assert!(!has_completion_signal("still working"));
        // Containment, not a tokenizer: "done" inside "undone" still counts.
        assert!(has_completion_signal("left the bug undone"));
    }
}
