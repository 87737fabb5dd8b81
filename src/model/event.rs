//! Events that drive state-machine transitions (§4.1) and events emitted
//! on the Event Bus (§4.9). These are related but distinct: every
//! transition event is published on the bus, but the bus also carries
//! finer-grained progress events (tool calls, output chunks) that never
//! touch the state machine.

use super::ids::{RunId, WorkOrderId};
use crate::error::GateErrorKind;
use serde::{Deserialize, Serialize};

/// Drives `apply()` in the state machine. Closed set mirroring the
/// 17-event vocabulary in spec §4.1 exactly; budget/timeout exhaustion and
/// driver-retry exhaustion are not separate events here — they surface
/// through `VerifyFailedTerminal`, `Cancel`, and `SystemError` respectively,
/// the same way the spec's table routes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionEvent {
    Lease,
    StartBuild,
    BuildOk,
    BuildFailed { kind: GateErrorKind, message: String },
    SnapshotOk,
    SnapshotFailed { kind: GateErrorKind, message: String },
    VerifyPassed,
    VerifyFailedRetryable,
    VerifyFailedTerminal { kind: GateErrorKind, message: String },
    FeedbackReady,
    OpenPr,
    StartCiPoll,
    CiPassed,
    CiFailed,
    CiTimeout,
    /// Covers both `USER_CANCELED` and a wall-clock-budget cancellation;
    /// `origin` on the resulting `RunResult` records which one it was.
    Cancel { origin: super::run::CancelOrigin },
    SystemError { kind: GateErrorKind, message: String },
}

/// Line item on the Event Bus (§4.9). `sequence` is monotonic per
/// work order and lets subscribers detect gaps after a `buffer_overflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub work_order_id: WorkOrderId,
    pub run_id: RunId,
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub payload: BusEventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusEventPayload {
    StateTransition {
        from: crate::model::run::RunState,
        to: crate::model::run::RunState,
    },
    ToolCall { name: String },
    ToolResult { name: String, is_error: bool },
    Output { content: String },
    Progress { percent: u8 },
    FileChanged { path: String },
    AgentError { message: String },
    RunStarted,
    RunCompleted,
    RunFailed { kind: GateErrorKind, message: String },
    /// Synthetic event inserted by the bus itself when a subscriber's
    /// buffer overflows and the oldest events had to be dropped.
    BufferOverflow { dropped: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_event_tags_match_wire_format() {
        let e = TransitionEvent::VerifyFailedTerminal {
            kind: GateErrorKind::TestFailed,
            message: "2 failing tests".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "verify_failed_terminal");
    }

    #[test]
    fn build_failed_carries_kind_and_message() {
        let e = TransitionEvent::BuildFailed {
            kind: GateErrorKind::BuildFailed,
            message: "compile error".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "build_failed");
        assert_eq!(json["kind"], "BUILD_FAILED");
    }
}
