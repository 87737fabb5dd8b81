//! Pure run lifecycle state machine (§4.1, component C1).
//!
//! `apply` takes a state and a [`TransitionEvent`] and returns the next
//! state with no side effects or I/O — persistence and event-bus
//! publication happen one layer up, in the Run Executor, which is the
//! sole caller of this module and the sole emitter of transition events.
//!
//! The transition table is intentionally exhaustive and closed: every
//! `(state, event)` pair not listed in [`TRANSITIONS`] is illegal, and
//! [`validate_transition_table`] checks at startup that every state
//! (other than the three terminal ones) can reach a terminal state and
//! that every `TransitionEvent` variant is used at least once.

use crate::model::event::TransitionEvent;
use crate::model::run::RunState;
use std::fmt;

#[derive(Debug, thiserror::Error)]
#[error("illegal transition: {event} from {from:?}")]
pub struct IllegalTransition {
    pub from: RunState,
    pub event: EventTag,
}

/// Tag used for table lookups and error messages, stripped of payload
/// data that would otherwise defeat equality/hash on the event enum.
/// Mirrors the 17-event vocabulary of spec §4.1 one-for-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    Lease,
    StartBuild,
    BuildOk,
    BuildFailed,
    SnapshotOk,
    SnapshotFailed,
    VerifyPassed,
    VerifyFailedRetryable,
    VerifyFailedTerminal,
    FeedbackReady,
    OpenPr,
    StartCiPoll,
    CiPassed,
    CiFailed,
    CiTimeout,
    Cancel,
    SystemError,
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&TransitionEvent> for EventTag {
    fn from(e: &TransitionEvent) -> Self {
        match e {
            TransitionEvent::Lease => EventTag::Lease,
            TransitionEvent::StartBuild => EventTag::StartBuild,
            TransitionEvent::BuildOk => EventTag::BuildOk,
            TransitionEvent::BuildFailed { .. } => EventTag::BuildFailed,
            TransitionEvent::SnapshotOk => EventTag::SnapshotOk,
            TransitionEvent::SnapshotFailed { .. } => EventTag::SnapshotFailed,
            TransitionEvent::VerifyPassed => EventTag::VerifyPassed,
            TransitionEvent::VerifyFailedRetryable => EventTag::VerifyFailedRetryable,
            TransitionEvent::VerifyFailedTerminal { .. } => EventTag::VerifyFailedTerminal,
            TransitionEvent::FeedbackReady => EventTag::FeedbackReady,
            TransitionEvent::OpenPr => EventTag::OpenPr,
            TransitionEvent::StartCiPoll => EventTag::StartCiPoll,
            TransitionEvent::CiPassed => EventTag::CiPassed,
            TransitionEvent::CiFailed => EventTag::CiFailed,
            TransitionEvent::CiTimeout => EventTag::CiTimeout,
            TransitionEvent::Cancel { .. } => EventTag::Cancel,
            TransitionEvent::SystemError { .. } => EventTag::SystemError,
        }
    }
}

const ALL_EVENT_TAGS: &[EventTag] = &[
    EventTag::Lease,
    EventTag::StartBuild,
    EventTag::BuildOk,
    EventTag::BuildFailed,
    EventTag::SnapshotOk,
    EventTag::SnapshotFailed,
    EventTag::VerifyPassed,
    EventTag::VerifyFailedRetryable,
    EventTag::VerifyFailedTerminal,
    EventTag::FeedbackReady,
    EventTag::OpenPr,
    EventTag::StartCiPoll,
    EventTag::CiPassed,
    EventTag::CiFailed,
    EventTag::CiTimeout,
    EventTag::Cancel,
    EventTag::SystemError,
];

const ALL_STATES: &[RunState] = &[
    RunState::Queued,
    RunState::Leased,
    RunState::Building,
    RunState::Snapshotting,
    RunState::Verifying,
    RunState::Feedback,
    RunState::PrCreated,
    RunState::CiPolling,
    RunState::Succeeded,
    RunState::Failed,
    RunState::Canceled,
];

/// `(from, event, to)` — the only legal transitions in the system,
/// matching spec §4.1's table exactly. Cancellation and `SYSTEM_ERROR`
/// are legal from every non-terminal state and are generated here rather
/// than listed per-state to keep the table readable.
fn base_transitions() -> Vec<(RunState, EventTag, RunState)> {
    use RunState::*;
    vec![
        (Queued, EventTag::Lease, Leased),
        (Leased, EventTag::StartBuild, Building),
        (Building, EventTag::BuildOk, Snapshotting),
        (Building, EventTag::BuildFailed, Failed),
        (Snapshotting, EventTag::SnapshotOk, Verifying),
        (Snapshotting, EventTag::SnapshotFailed, Failed),
        (Verifying, EventTag::VerifyPassed, Succeeded),
        (Verifying, EventTag::VerifyFailedRetryable, Feedback),
        (Verifying, EventTag::VerifyFailedTerminal, Failed),
        (Verifying, EventTag::OpenPr, PrCreated),
        (Feedback, EventTag::FeedbackReady, Building),
        // Must-have: fixes the "max-iterations after CI fail" bug — a
        // budget/loop-detection stop reached from FEEDBACK (e.g. after a
        // CI_FAILED bounce) terminates instead of looping forever.
        (Feedback, EventTag::VerifyFailedTerminal, Failed),
        (PrCreated, EventTag::StartCiPoll, CiPolling),
        (PrCreated, EventTag::VerifyPassed, Succeeded),
        (CiPolling, EventTag::CiPassed, Succeeded),
        (CiPolling, EventTag::CiFailed, Feedback),
        (CiPolling, EventTag::CiTimeout, Failed),
    ]
}

fn non_terminal_states() -> impl Iterator<Item = RunState> {
    ALL_STATES.iter().copied().filter(|s| !s.is_terminal())
}

fn build_transitions() -> Vec<(RunState, EventTag, RunState)> {
    let mut table = base_transitions();
    for state in non_terminal_states() {
        table.push((state, EventTag::Cancel, RunState::Canceled));
        table.push((state, EventTag::SystemError, RunState::Failed));
    }
    table
}

/// Full transition table, including the blanket cancel/system-error rules
/// applied to every non-terminal state. Built once and memoized since
/// the table is pure data consulted on every `apply` call.
static TRANSITIONS: once_cell::sync::Lazy<Vec<(RunState, EventTag, RunState)>> =
    once_cell::sync::Lazy::new(build_transitions);

pub fn transitions() -> Vec<(RunState, EventTag, RunState)> {
    TRANSITIONS.clone()
}

/// Apply `event` to `state`, returning the next state or
/// [`IllegalTransition`] if no rule matches.
pub fn apply(state: RunState, event: &TransitionEvent) -> Result<RunState, IllegalTransition> {
    let tag = EventTag::from(event);
    TRANSITIONS
        .iter()
        .find(|(from, ev, _)| *from == state && *ev == tag)
        .map(|(_, _, to)| *to)
        .ok_or(IllegalTransition { from: state, event: tag })
}

#[derive(Debug, thiserror::Error)]
pub enum TableValidationError {
    #[error("state {0:?} cannot reach any terminal state")]
    Unreachable(RunState),
    #[error("event {0:?} is never used by any transition")]
    UnusedEvent(EventTag),
}

/// Startup invariant check: every non-terminal state must be able to
/// reach a terminal state, and every declared event must appear in at
/// least one transition. Intended to run once at process start, not on
/// the hot path.
pub fn validate_transition_table() -> Result<(), Vec<TableValidationError>> {
    let table = transitions();
    let mut errors = Vec::new();

    for state in non_terminal_states() {
        if !can_reach_terminal(state, &table) {
            errors.push(TableValidationError::Unreachable(state));
        }
    }

    for tag in ALL_EVENT_TAGS {
        if !table.iter().any(|(_, ev, _)| ev == tag) {
            errors.push(TableValidationError::UnusedEvent(*tag));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn can_reach_terminal(start: RunState, table: &[(RunState, EventTag, RunState)]) -> bool {
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![start];
    while let Some(s) = stack.pop() {
        if s.is_terminal() {
            return true;
        }
        if !visited.insert(s) {
            continue;
        }
        for (from, _, to) in table {
            if *from == s {
                stack.push(*to);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateErrorKind;
    use crate::model::run::CancelOrigin;

    fn verify_failed_terminal() -> TransitionEvent {
        TransitionEvent::VerifyFailedTerminal {
            kind: GateErrorKind::TestFailed,
            message: "boom".into(),
        }
    }

    #[test]
    fn table_is_well_formed() {
        validate_transition_table().expect("transition table must validate");
    }

    #[test]
    fn queued_only_accepts_lease() {
        assert_eq!(apply(RunState::Queued, &TransitionEvent::Lease).unwrap(), RunState::Leased);
        assert!(apply(RunState::Queued, &TransitionEvent::StartBuild).is_err());
    }

    #[test]
    fn build_failed_is_terminal_from_building() {
        let failed = TransitionEvent::BuildFailed {
            kind: GateErrorKind::BuildFailed,
            message: "compile error".into(),
        };
        assert_eq!(apply(RunState::Building, &failed).unwrap(), RunState::Failed);
    }

    #[test]
    fn snapshot_failed_is_terminal_from_snapshotting() {
        let failed = TransitionEvent::SnapshotFailed {
            kind: GateErrorKind::SystemError,
            message: "disk full".into(),
        };
        assert_eq!(apply(RunState::Snapshotting, &failed).unwrap(), RunState::Failed);
    }

    #[test]
    fn verify_failed_retryable_routes_to_feedback_from_verifying() {
        assert_eq!(
            apply(RunState::Verifying, &TransitionEvent::VerifyFailedRetryable).unwrap(),
            RunState::Feedback
        );
    }

    #[test]
    fn verify_failed_terminal_ends_the_run_from_verifying_or_feedback() {
        assert_eq!(apply(RunState::Verifying, &verify_failed_terminal()).unwrap(), RunState::Failed);
        assert_eq!(apply(RunState::Feedback, &verify_failed_terminal()).unwrap(), RunState::Failed);
    }

    #[test]
    fn feedback_loops_back_to_building() {
        assert_eq!(
            apply(RunState::Feedback, &TransitionEvent::FeedbackReady).unwrap(),
            RunState::Building
        );
    }

    #[test]
    fn cancel_is_legal_from_every_non_terminal_state() {
        for state in non_terminal_states() {
            let cancel = TransitionEvent::Cancel { origin: CancelOrigin::User };
            assert_eq!(apply(state, &cancel).unwrap(), RunState::Canceled);
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let cancel = TransitionEvent::Cancel { origin: CancelOrigin::User };
        for state in [RunState::Succeeded, RunState::Failed, RunState::Canceled] {
            assert!(apply(state, &cancel).is_err());
        }
    }

    #[test]
    fn pr_path_reaches_succeeded_without_ci() {
        assert_eq!(apply(RunState::Verifying, &TransitionEvent::OpenPr).unwrap(), RunState::PrCreated);
        assert_eq!(
            apply(RunState::PrCreated, &TransitionEvent::VerifyPassed).unwrap(),
            RunState::Succeeded
        );
    }

    #[test]
    fn ci_polling_path() {
        assert_eq!(
            apply(RunState::PrCreated, &TransitionEvent::StartCiPoll).unwrap(),
            RunState::CiPolling
        );
        assert_eq!(
            apply(RunState::CiPolling, &TransitionEvent::CiPassed).unwrap(),
            RunState::Succeeded
        );
    }

    #[test]
    fn ci_failed_bounces_back_to_feedback_not_failed() {
        // Bug #65: CI failure must be able to loop back for another
        // iteration, not dead-end the run.
        assert_eq!(
            apply(RunState::CiPolling, &TransitionEvent::CiFailed).unwrap(),
            RunState::Feedback
        );
    }

    #[test]
    fn ci_timeout_ends_the_run() {
        assert_eq!(
            apply(RunState::CiPolling, &TransitionEvent::CiTimeout).unwrap(),
            RunState::Failed
        );
    }
}
