//! `Ralph`: stop on the agent's completion signal, or once its last 3
//! outputs have converged — every pairwise Jaccard token similarity in
//! the window is at least 0.95 (a convergence threshold of 0.05
//! difference, per §4.6). Named for the "Ralph Wiggum" style loop this
//! guards against: an agent that keeps re-stating a near-identical
//! answer without ever emitting a clean completion signal.

use super::{has_completion_signal, Decision, IterationContext, LoopStrategy};
use std::collections::{HashSet, VecDeque};

const WINDOW: usize = 3;
const CONVERGENCE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Default)]
pub struct Ralph {
    outputs: VecDeque<String>,
}

impl Ralph {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, output: &str) {
        self.outputs.push_back(output.to_string());
        if self.outputs.len() > WINDOW {
            self.outputs.pop_front();
        }
    }

    fn has_converged(&self) -> bool {
        if self.outputs.len() < WINDOW {
            return false;
        }
        let token_sets: Vec<HashSet<&str>> = self.outputs.iter().map(|o| tokenize(o)).collect();
        token_sets
            .iter()
            .enumerate()
            .flat_map(|(i, a)| token_sets[i + 1..].iter().map(move |b| jaccard(a, b)))
            .all(|similarity| 1.0 - similarity <= CONVERGENCE_THRESHOLD)
    }
}

fn tokenize(text: &str) -> HashSet<&str> {
    text.split_whitespace().collect()
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

impl LoopStrategy for Ralph {
    fn should_continue(&mut self, ctx: &IterationContext<'_>) -> Decision {
        if ctx.verification_passed {
            return Decision::stop("verification passed");
        }
        if has_completion_signal(ctx.agent_output) {
            return Decision::stop("agent signaled completion");
        }

        self.record(ctx.agent_output);
        if self.has_converged() {
            return Decision::stop_partial("agent output converged without a completion signal");
        }

        if ctx.iteration + 1 >= ctx.max_iterations {
            return Decision::stop_partial("iteration budget exhausted");
        }

        Decision::Continue
    }

    fn reset(&mut self) {
        self.outputs.clear();
    }
}
