//! Retry Policy Engine (§4.5, component C5). Exponential backoff with a
//! cap and jitter, keyed on the closed [`GateErrorKind`] taxonomy rather
//! than the free-text error matchers `cook/retry_v2.rs` uses — AgentGate
//! only ever needs to decide retry eligibility per error *kind*, not per
//! message pattern.

use crate::error::GateErrorKind;
use rand::Rng;
use std::time::Duration;

/// One policy instance. `max_attempts` counts the initial attempt, so
/// `max_attempts: 3` means up to 2 retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
    /// Error kinds this policy will retry. Anything not in this set is
    /// treated as non-retryable regardless of `GateErrorKind::is_retryable_by_default`.
    pub retryable: Vec<GateErrorKind>,
}

impl RetryPolicy {
    /// Three attempts, 500ms base doubling up to 30s, 20% jitter, retrying
    /// the kinds the spec marks retryable by default.
    pub fn default_policy() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.2,
            retryable: vec![
                GateErrorKind::SystemError,
                GateErrorKind::GithubError,
                GateErrorKind::NetworkError,
            ],
        }
    }

    /// Six attempts, shorter base delay, wider jitter — for work orders
    /// explicitly flagged as tolerant of flaky infrastructure.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_fraction: 0.4,
            retryable: vec![
                GateErrorKind::SystemError,
                GateErrorKind::GithubError,
                GateErrorKind::NetworkError,
                GateErrorKind::AgentTimeout,
            ],
        }
    }

    /// A single attempt, no retries. Used when a work order's policy
    /// explicitly disables retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_fraction: 0.0,
            retryable: vec![],
        }
    }

    pub fn allows(&self, kind: GateErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay before `attempt` (1-indexed: the delay *before* the 2nd
    /// attempt is `delay_for(1)`), exponential with a hard cap, plus
    /// up to `jitter_fraction` of extra random delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = (self.base_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        let jitter = rand::rng().random_range(0.0..=(raw * self.jitter_fraction));
        Duration::from_secs_f64((raw + jitter).min(self.max_delay.as_secs_f64()))
    }
}

/// One recorded attempt, kept for the run's attempt ledger (§4.5).
#[derive(Debug, Clone)]
pub struct Attempt {
    pub number: u32,
    pub kind: GateErrorKind,
    pub message: String,
    pub delay_before_next: Option<Duration>,
}

/// Decision returned after an error: either retry after a delay, or give
/// up because the policy's attempt budget or retryability rule says so.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Exhausted,
    NotRetryable,
}

/// Tracks attempts for a single operation (one run's current iteration
/// attempt, not the whole run) and decides what happens next.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: Vec<Attempt>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempts: Vec::new() }
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Record a failure and decide whether to retry.
    pub fn record_failure(&mut self, kind: GateErrorKind, message: impl Into<String>) -> RetryDecision {
        let number = self.attempts.len() as u32 + 1;
        if !self.policy.allows(kind) {
            self.attempts.push(Attempt { number, kind, message: message.into(), delay_before_next: None });
            return RetryDecision::NotRetryable;
        }
        if number >= self.policy.max_attempts {
            self.attempts.push(Attempt { number, kind, message: message.into(), delay_before_next: None });
            return RetryDecision::Exhausted;
        }
        let delay = self.policy.delay_for(number);
        self.attempts.push(Attempt {
            number,
            kind,
            message: message.into(),
            delay_before_next: Some(delay),
        });
        RetryDecision::Retry { delay }
    }
}
