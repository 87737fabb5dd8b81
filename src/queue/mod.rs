//! Queue / Lease Manager (§4.6, component C7): a bounded FIFO of work
//! orders gated by a `Semaphore`-backed concurrency limit, with a second
//! bound on how many runs may wait behind it. Grounded on
//! `worktree/pool.rs`'s acquire/release/`Handle`-with-`Drop` shape,
//! generalized from worktree checkout to run-lease checkout.

pub mod rollout;

pub use rollout::RolloutQueue;

use crate::error::GateError;
use crate::model::{Lease, RunId, WorkOrderId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Coarse health classification surfaced to operators (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct QueueStats {
    pub waiting: usize,
    pub running: usize,
    pub max_concurrent_runs: usize,
    pub max_queue_size: usize,
    pub accepting: bool,
    pub health: QueueHealth,
}

impl QueueStats {
    fn classify(waiting: usize, running: usize, max_concurrent_runs: usize, max_queue_size: usize, accepting: bool) -> QueueHealth {
        if !accepting {
            return QueueHealth::Unhealthy;
        }
        let denom = (max_concurrent_runs + max_queue_size) as f64;
        if denom == 0.0 {
            return QueueHealth::Unhealthy;
        }
        let utilization = (waiting + running) as f64 / denom;
        if utilization <= 0.8 {
            QueueHealth::Healthy
        } else {
            QueueHealth::Degraded
        }
    }
}

struct QueueEntry {
    run_id: RunId,
    work_order_id: WorkOrderId,
}

/// Proof of an admitted slot. Releasing happens when this guard drops,
/// the same `Drop`-based safety net `worktree/pool.rs` uses for
/// `WorktreeHandle` so a panicking caller can never leak a permit.
pub struct LeaseGuard {
    pub lease: Lease,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Result of `enqueue` (§4.6): either the run was leased a slot
/// immediately, or it was placed at `position` (1-based) in the waiting
/// FIFO behind runs already ahead of it.
pub struct EnqueueOutcome {
    pub leased: bool,
    pub position: Option<usize>,
    pub lease: Option<LeaseGuard>,
}

/// Bounded FIFO admission queue. `enqueue` never blocks: it either leases
/// a free slot immediately, queues behind `max_queue_size` waiting runs,
/// or rejects with `BACKPRESSURE`. `lease_next` blocks (async) until both
/// a waiting entry and a freed permit are available — used to promote the
/// next queued run once a running one releases its slot.
pub struct QueueManager {
    max_concurrent_runs: usize,
    max_queue_size: usize,
    semaphore: Arc<Semaphore>,
    entries: Mutex<VecDeque<QueueEntry>>,
    accepting: std::sync::atomic::AtomicBool,
}

impl QueueManager {
    pub fn new(max_concurrent_runs: usize, max_queue_size: usize) -> Self {
        Self {
            max_concurrent_runs,
            max_queue_size,
            semaphore: Arc::new(Semaphore::new(max_concurrent_runs)),
            entries: Mutex::new(VecDeque::new()),
            accepting: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Stop admitting new work (existing leases and queued entries are
    /// unaffected). Surfaced as `unhealthy` regardless of utilization.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn enqueue(&self, run_id: RunId, work_order_id: WorkOrderId) -> Result<EnqueueOutcome, GateError> {
        if !self.accepting.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GateError::backpressure("queue is not accepting new work"));
        }
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(EnqueueOutcome {
                leased: true,
                position: None,
                lease: Some(LeaseGuard {
                    lease: Lease::new(run_id, work_order_id),
                    _permit: permit,
                }),
            });
        }

        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_queue_size {
            return Err(GateError::backpressure(format!(
                "queue full: {} waiting runs",
                entries.len()
            )));
        }
        entries.push_back(QueueEntry { run_id, work_order_id });
        Ok(EnqueueOutcome {
            leased: false,
            position: Some(entries.len()),
            lease: None,
        })
    }

    /// 1-based position of `run_id` among waiting runs, or `None` if it
    /// isn't currently queued (either leased already, or unknown).
    pub async fn position(&self, run_id: RunId) -> Option<usize> {
        self.entries
            .lock()
            .await
            .iter()
            .position(|e| e.run_id == run_id)
            .map(|i| i + 1)
    }

    /// Block until a permit is free, then pop and lease the head of the
    /// queue. Returns `None` if the queue is empty even after acquiring
    /// a permit (the permit is dropped, returning it to the pool).
    pub async fn lease_next(&self) -> Option<LeaseGuard> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let mut entries = self.entries.lock().await;
        let entry = entries.pop_front()?;
        drop(entries);
        Some(LeaseGuard {
            lease: Lease::new(entry.run_id, entry.work_order_id),
            _permit: permit,
        })
    }

    pub async fn stats(&self) -> QueueStats {
        let waiting = self.entries.lock().await.len();
        let running = self.max_concurrent_runs - self.semaphore.available_permits();
        let accepting = self.accepting.load(std::sync::atomic::Ordering::SeqCst);
        QueueStats {
            waiting,
            running,
            max_concurrent_runs: self.max_concurrent_runs,
            max_queue_size: self.max_queue_size,
            accepting,
            health: QueueStats::classify(waiting, running, self.max_concurrent_runs, self.max_queue_size, accepting),
        }
    }
}
