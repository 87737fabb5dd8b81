//! Closed error taxonomy shared across the execution core.
//!
//! Every error the core can produce carries one [`GateErrorKind`] from the
//! set fixed by the specification. Component-local error types (state
//! machine, storage, subprocess) convert into [`GateError`] at their
//! boundary so the Retry Policy Engine and the Run Executor only ever have
//! to classify one shape of error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of error kinds. Adding a variant is a spec change, not a
/// routine code change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateErrorKind {
    SystemError,
    GithubError,
    NetworkError,
    AgentTimeout,
    AgentCrash,
    WorkspaceError,
    BuildFailed,
    TypecheckFailed,
    TestFailed,
    VerificationFailed,
    PolicyViolation,
    IllegalTransition,
    Backpressure,
    Cancelled,
}

impl GateErrorKind {
    /// Whether this kind is, in isolation, eligible for retry consideration.
    /// The final decision also depends on the active [`crate::retry::RetryPolicy`].
    pub fn is_retryable_by_default(self) -> bool {
        matches!(
            self,
            GateErrorKind::SystemError | GateErrorKind::GithubError | GateErrorKind::NetworkError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GateErrorKind::SystemError => "SYSTEM_ERROR",
            GateErrorKind::GithubError => "GITHUB_ERROR",
            GateErrorKind::NetworkError => "NETWORK_ERROR",
            GateErrorKind::AgentTimeout => "AGENT_TIMEOUT",
            GateErrorKind::AgentCrash => "AGENT_CRASH",
            GateErrorKind::WorkspaceError => "WORKSPACE_ERROR",
            GateErrorKind::BuildFailed => "BUILD_FAILED",
            GateErrorKind::TypecheckFailed => "TYPECHECK_FAILED",
            GateErrorKind::TestFailed => "TEST_FAILED",
            GateErrorKind::VerificationFailed => "VERIFICATION_FAILED",
            GateErrorKind::PolicyViolation => "POLICY_VIOLATION",
            GateErrorKind::IllegalTransition => "ILLEGAL_TRANSITION",
            GateErrorKind::Backpressure => "BACKPRESSURE",
            GateErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for GateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged error carrying a [`GateErrorKind`], a human-readable message,
/// and an optional underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GateError {
    pub kind: GateErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl GateError {
    pub fn new(kind: GateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: GateErrorKind,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(GateErrorKind::SystemError, message)
    }

    pub fn illegal_transition(message: impl Into<String>) -> Self {
        Self::new(GateErrorKind::IllegalTransition, message)
    }

    pub fn backpressure(message: impl Into<String>) -> Self {
        Self::new(GateErrorKind::Backpressure, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_defaults_match_spec_taxonomy() {
        assert!(GateErrorKind::SystemError.is_retryable_by_default());
        assert!(GateErrorKind::NetworkError.is_retryable_by_default());
        assert!(GateErrorKind::GithubError.is_retryable_by_default());
        assert!(!GateErrorKind::TestFailed.is_retryable_by_default());
        assert!(!GateErrorKind::PolicyViolation.is_retryable_by_default());
    }

    #[test]
    fn display_matches_wire_tag() {
        assert_eq!(
            GateErrorKind::VerificationFailed.to_string(),
            "VERIFICATION_FAILED"
        );
    }
}
