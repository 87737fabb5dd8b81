//! The `Run` record and its state enum (§3, §4.1).

use super::ids::{RunId, WorkOrderId};
use crate::error::GateErrorKind;
use serde::{Deserialize, Serialize};

/// Closed set of run states. Every transition between them is governed
/// by the table in `state_machine.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Queued,
    Leased,
    Building,
    Snapshotting,
    Verifying,
    Feedback,
    PrCreated,
    CiPolling,
    Succeeded,
    Failed,
    Canceled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Canceled
        )
    }
}

/// Closed result tag set (§7): every terminal `FAILED` carries one of the
/// `Failed*` variants, `SUCCEEDED` always carries `Passed`, `CANCELED`
/// always carries `Canceled` plus an `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResultTag {
    Passed,
    FailedBuild,
    FailedVerification,
    FailedError,
    FailedTimeout,
    Canceled,
}

/// Who/what triggered a `CANCELED` terminal state (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOrigin {
    User,
    Timeout,
    Admin,
}

/// Outcome recorded once a run reaches a terminal state. `None` while
/// the run is still in flight; `Some` if and only if `state.is_terminal()`
/// (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub tag: RunResultTag,
    pub error_kind: Option<GateErrorKind>,
    pub message: Option<String>,
    /// Set only when `tag == Canceled`.
    pub origin: Option<CancelOrigin>,
}

impl RunResult {
    pub fn passed() -> Self {
        Self {
            tag: RunResultTag::Passed,
            error_kind: None,
            message: None,
            origin: None,
        }
    }

    pub fn failed(tag: RunResultTag, kind: GateErrorKind, message: impl Into<String>) -> Self {
        debug_assert_ne!(tag, RunResultTag::Passed);
        debug_assert_ne!(tag, RunResultTag::Canceled);
        Self {
            tag,
            error_kind: Some(kind),
            message: Some(message.into()),
            origin: None,
        }
    }

    pub fn canceled(origin: CancelOrigin) -> Self {
        Self {
            tag: RunResultTag::Canceled,
            error_kind: None,
            message: None,
            origin: Some(origin),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.tag == RunResultTag::Passed
    }
}

/// One entry in a run's append-only history. Recorded by the state
/// machine on every successful `apply()` call, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from: RunState,
    pub to: RunState,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// The mutable record tracked by the Run Store for one work order's
/// execution. A work order may be retried across multiple `Run`s only
/// if the caller resubmits it as a new work order — within a single
/// `Run`, iteration count and history only grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub work_order_id: WorkOrderId,
    pub state: RunState,
    pub iteration: u32,
    pub max_iterations: u32,
    pub result: Option<RunResult>,
    pub history: Vec<HistoryEntry>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Run {
    pub fn new(work_order_id: WorkOrderId, max_iterations: u32) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: RunId::new(),
            work_order_id,
            state: RunState::Queued,
            iteration: 0,
            max_iterations,
            result: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_run_starts_queued_with_no_result() {
        let run = Run::new(WorkOrderId::new(), 5);
        assert_eq!(run.state, RunState::Queued);
        assert!(run.result.is_none());
        assert!(run.history.is_empty());
    }

    #[test]
    fn only_terminal_states_are_terminal() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Canceled.is_terminal());
        assert!(!RunState::Verifying.is_terminal());
        assert!(!RunState::Queued.is_terminal());
    }
}
