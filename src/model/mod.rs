//! Data model shared by every component: identifiers, the `Run` record
//! and its state enum, work orders, transition/bus events, per-iteration
//! records, and queue leases.

pub mod event;
pub mod ids;
pub mod iteration;
pub mod lease;
pub mod run;
pub mod work_order;

pub use event::{BusEvent, BusEventPayload, TransitionEvent};
pub use ids::{RunId, WorkOrderId, WorkspaceId};
pub use iteration::{AgentResult, IterationRecord, LevelResult, Snapshot, VerificationReport};
pub use lease::Lease;
pub use run::{CancelOrigin, HistoryEntry, Run, RunResult, RunResultTag, RunState};
pub use work_order::{BillingMode, GatePlan, Policies, WorkOrder, WorkspaceSource};
