//! `Fixed`: run exactly up to `max_iterations`, stopping only on a clean
//! verification pass or budget exhaustion. The simplest strategy, used
//! as the default for work orders that don't opt into loop-detection
//! heuristics.

use super::{Decision, IterationContext, LoopStrategy};

#[derive(Debug, Default)]
pub struct Fixed;

impl LoopStrategy for Fixed {
    fn should_continue(&mut self, ctx: &IterationContext<'_>) -> Decision {
        if ctx.verification_passed {
            return Decision::stop("verification passed");
        }
        if ctx.iteration + 1 >= ctx.max_iterations {
            return Decision::stop_partial("iteration budget exhausted");
        }
        Decision::Continue
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(iteration: u32, max_iterations: u32, verification_passed: bool) -> IterationContext<'static> {
        IterationContext {
            iteration,
            max_iterations,
            agent_output: "",
            content_hash: "",
            verification_passed,
            no_changes: false,
            ci_passed: false,
            highest_level_passed: if verification_passed { Some(3) } else { None },
        }
    }

    #[test]
    fn stops_on_verification_pass() {
        let mut strategy = Fixed;
        assert_eq!(
            strategy.should_continue(&ctx(0, 5, true)),
            Decision::stop("verification passed")
        );
    }

    #[test]
    fn continues_until_last_iteration() {
        let mut strategy = Fixed;
        assert_eq!(strategy.should_continue(&ctx(0, 3, false)), Decision::Continue);
        assert_eq!(strategy.should_continue(&ctx(1, 3, false)), Decision::Continue);
        assert_eq!(
            strategy.should_continue(&ctx(2, 3, false)),
            Decision::stop_partial("iteration budget exhausted")
        );
    }
}
