//! In-memory `RunStore`, used by tests and by the CLI harness's dry-run
//! mode. Grounded on the file backend's shape but backed by a `Mutex`
//! instead of the filesystem.

use super::{error::StorageResult, AuditEntry, RunStore, RunSummary};
use crate::model::{IterationRecord, Run, RunId};
use crate::store::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<RunId, Run>>,
    iterations: Mutex<HashMap<RunId, Vec<IterationRecord>>>,
    audit: Mutex<Vec<AuditEntry>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save_run(&self, run: &Run) -> StorageResult<()> {
        self.runs
            .lock()
            .map_err(|_| StorageError::serialization("poisoned run map"))?
            .insert(run.id, run.clone());
        Ok(())
    }

    async fn load_run(&self, id: RunId) -> StorageResult<Run> {
        self.runs
            .lock()
            .map_err(|_| StorageError::serialization("poisoned run map"))?
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn save_iteration(&self, record: &IterationRecord) -> StorageResult<()> {
        let mut guard = self
            .iterations
            .lock()
            .map_err(|_| StorageError::serialization("poisoned iteration map"))?;
        let entries = guard.entry(record.run_id).or_default();
        if let Some(slot) = entries.iter_mut().find(|r| r.iteration == record.iteration) {
            *slot = record.clone();
        } else {
            entries.push(record.clone());
        }
        Ok(())
    }

    async fn load_iterations(&self, run_id: RunId) -> StorageResult<Vec<IterationRecord>> {
        let mut records = self
            .iterations
            .lock()
            .map_err(|_| StorageError::serialization("poisoned iteration map"))?
            .get(&run_id)
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|r| r.iteration);
        Ok(records)
    }

    async fn list_runs(&self) -> StorageResult<Vec<RunSummary>> {
        Ok(self
            .runs
            .lock()
            .map_err(|_| StorageError::serialization("poisoned run map"))?
            .values()
            .map(RunSummary::from)
            .collect())
    }

    async fn append_audit(&self, entry: AuditEntry) -> StorageResult<()> {
        self.audit
            .lock()
            .map_err(|_| StorageError::serialization("poisoned audit log"))?
            .push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkOrderId;

    #[tokio::test]
    async fn round_trips_a_run() {
        let store = MemoryRunStore::new();
        let run = Run::new(WorkOrderId::new(), 5);
        store.save_run(&run).await.unwrap();
        let loaded = store.load_run(run.id).await.unwrap();
        assert_eq!(loaded.id, run.id);
    }

    #[tokio::test]
    async fn missing_run_is_not_found() {
        let store = MemoryRunStore::new();
        let err = store.load_run(RunId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn iterations_come_back_sorted() {
        let store = MemoryRunStore::new();
        let run_id = RunId::new();
        store
            .save_iteration(&IterationRecord::new(run_id, 2))
            .await
            .unwrap();
        store
            .save_iteration(&IterationRecord::new(run_id, 0))
            .await
            .unwrap();
        store
            .save_iteration(&IterationRecord::new(run_id, 1))
            .await
            .unwrap();
        let loaded = store.load_iterations(run_id).await.unwrap();
        let nums: Vec<u32> = loaded.iter().map(|r| r.iteration).collect();
        assert_eq!(nums, vec![0, 1, 2]);
    }
}
