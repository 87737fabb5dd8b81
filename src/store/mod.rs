//! Run Store (§4.2, component C2) — durable home for `Run` and
//! `IterationRecord`s. Two backends: an in-memory store for tests and a
//! JSON-per-record file store for production, matching the layout in
//! SPEC_FULL.md §5: `<root>/runs/<run-id>/{agent-<iter>.json,
//! verification-<iter>.json, run.json}` plus `<root>/audit/<run-id>.json`.

pub mod error;
pub mod file;
pub mod memory;

use crate::model::{IterationRecord, Run, RunId, RunState};
use async_trait::async_trait;
use error::StorageResult;
use serde::{Deserialize, Serialize};

/// Lightweight projection of a `Run`, returned by `list_runs` so callers
/// don't have to load full iteration history just to render a queue view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub work_order_id: crate::model::WorkOrderId,
    pub state: RunState,
    pub iteration: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id,
            work_order_id: run.work_order_id,
            state: run.state,
            iteration: run.iteration,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

/// How a store should react to a record it cannot parse while loading.
/// (SPEC_FULL.md §9, supplement 4.2a.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictnessMode {
    /// Abort the load, surfacing `StorageError::Corrupt`.
    FailFast,
    /// Log the corrupt record via `tracing::warn!` and omit it from the
    /// result instead of failing the whole load.
    LogAndSkip,
}

/// Append-only audit line, written alongside run records but never read
/// back by the core itself — a forensic trail for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: chrono::DateTime<chrono::Utc>,
    pub run_id: RunId,
    pub summary: String,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save_run(&self, run: &Run) -> StorageResult<()>;
    async fn load_run(&self, id: RunId) -> StorageResult<Run>;
    async fn save_iteration(&self, record: &IterationRecord) -> StorageResult<()>;
    async fn load_iterations(&self, run_id: RunId) -> StorageResult<Vec<IterationRecord>>;
    async fn list_runs(&self) -> StorageResult<Vec<RunSummary>>;
    async fn append_audit(&self, entry: AuditEntry) -> StorageResult<()>;
}
