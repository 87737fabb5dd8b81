//! Lease handed out by the Queue / Lease Manager (§4.7, C7).

use super::ids::{RunId, WorkOrderId};

/// Proof that a run currently holds one of the queue's bounded admission
/// slots. Dropping it releases the slot — see `queue::LeaseGuard`, which
/// wraps this record with the actual `Drop` impl and semaphore permit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub run_id: RunId,
    pub work_order_id: WorkOrderId,
    pub leased_at: chrono::DateTime<chrono::Utc>,
}

impl Lease {
    pub fn new(run_id: RunId, work_order_id: WorkOrderId) -> Self {
        Self {
            run_id,
            work_order_id,
            leased_at: chrono::Utc::now(),
        }
    }
}
