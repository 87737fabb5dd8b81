//! `Hybrid`: four prioritized stop checks, evaluated in order (§4.5):
//!
//! 1. max-iterations reached — stop, with `partial_accept` set iff any
//!    verification level was reached this run
//! 2. a configured subset of completion criteria (`VERIFICATION_PASS`,
//!    `NO_CHANGES`, `CI_PASS`, `AGENT_SIGNAL`)
//! 3. content-hash loop detection over a sliding window of 5 iterations
//!    (stop if the last 3 hashes are identical)
//! 4. continue
//!
//! The first check to fire wins; everything else falls through.

use super::{has_completion_signal, CompletionCriterion, Decision, IterationContext, LoopStrategy};
use std::collections::VecDeque;

const WINDOW: usize = 5;
const STALL_RUN: usize = 3;

/// Default completion criteria: matches the strategy's pre-configuration
/// behavior of stopping on a clean verification pass or an explicit
/// agent self-report, without requiring `NO_CHANGES`/`CI_PASS` wiring
/// from callers who don't need them.
fn default_criteria() -> Vec<CompletionCriterion> {
    vec![CompletionCriterion::VerificationPass, CompletionCriterion::AgentSignal]
}

#[derive(Debug)]
pub struct Hybrid {
    hashes: VecDeque<String>,
    criteria: Vec<CompletionCriterion>,
}

impl Default for Hybrid {
    fn default() -> Self {
        Self { hashes: VecDeque::new(), criteria: default_criteria() }
    }
}

impl Hybrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_criteria(criteria: Vec<CompletionCriterion>) -> Self {
        Self { hashes: VecDeque::new(), criteria }
    }

    fn record_hash(&mut self, hash: &str) {
        self.hashes.push_back(hash.to_string());
        if self.hashes.len() > WINDOW {
            self.hashes.pop_front();
        }
    }

    /// True once the most recent `STALL_RUN` hashes are all identical —
    /// the agent is producing the same verified outcome iteration after
    /// iteration.
    fn is_stalled(&self) -> bool {
        if self.hashes.len() < STALL_RUN {
            return false;
        }
        let tail: Vec<&String> = self.hashes.iter().rev().take(STALL_RUN).collect();
        tail.windows(2).all(|pair| pair[0] == pair[1])
    }

    fn criterion_hit(&self, criterion: CompletionCriterion, ctx: &IterationContext<'_>) -> Option<&'static str> {
        let hit = match criterion {
            CompletionCriterion::VerificationPass => ctx.verification_passed,
            CompletionCriterion::NoChanges => ctx.no_changes,
            CompletionCriterion::CiPass => ctx.ci_passed,
            CompletionCriterion::AgentSignal => has_completion_signal(ctx.agent_output),
        };
        hit.then(|| match criterion {
            CompletionCriterion::VerificationPass => "verification passed",
            CompletionCriterion::NoChanges => "no changes produced",
            CompletionCriterion::CiPass => "CI passed",
            CompletionCriterion::AgentSignal => "agent signaled completion",
        })
    }
}

impl LoopStrategy for Hybrid {
    fn should_continue(&mut self, ctx: &IterationContext<'_>) -> Decision {
        if ctx.iteration + 1 >= ctx.max_iterations {
            let partial_accept = ctx.highest_level_passed.is_some();
            return Decision::Stop {
                reason: "iteration budget exhausted".into(),
                partial_accept,
            };
        }

        for criterion in &self.criteria {
            if let Some(reason) = self.criterion_hit(*criterion, ctx) {
                return Decision::stop(reason);
            }
        }

        self.record_hash(ctx.content_hash);
        if self.is_stalled() {
            return Decision::stop_partial("content hash stalled for 3 consecutive iterations");
        }

        Decision::Continue
    }

    fn reset(&mut self) {
        self.hashes.clear();
    }
}
