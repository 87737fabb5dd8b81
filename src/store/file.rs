//! File-based `RunStore`: one directory per run under `<root>/runs/`,
//! one file per run-level record, split agent/verification files per
//! iteration as named in the original layout (§5):
//!
//! ```text
//! <root>/runs/<run-id>/run.json
//! <root>/runs/<run-id>/agent-<iter>.json
//! <root>/runs/<run-id>/verification-<iter>.json
//! <root>/audit/<run-id>.json
//! ```
//!
//! Each record carries a `version` field for forward compatibility
//! (SPEC_FULL.md §5). Grounded on `storage/backends/file.rs`'s
//! create-dir-then-write-json shape, adapted from an async-trait-object
//! backend selected by config to this crate's single concrete store.

use super::{error::StorageResult, AuditEntry, RunStore, RunSummary, StrictnessMode};
use crate::model::{IterationRecord, Run, RunId};
use crate::store::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Versioned<T> {
    version: u32,
    #[serde(flatten)]
    record: T,
}

#[derive(Serialize, Deserialize)]
struct AgentFile {
    run_id: RunId,
    iteration: u32,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: Option<chrono::DateTime<chrono::Utc>>,
    agent_result: Option<crate::model::AgentResult>,
    content_hash: Option<String>,
    error: Option<(crate::error::GateErrorKind, String)>,
}

#[derive(Serialize, Deserialize)]
struct VerificationFile {
    verification: Option<crate::model::VerificationReport>,
    snapshot: Option<crate::model::Snapshot>,
}

pub struct FileRunStore {
    root: PathBuf,
    strictness: StrictnessMode,
}

impl FileRunStore {
    pub async fn new(root: impl Into<PathBuf>, strictness: StrictnessMode) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("runs")).await?;
        fs::create_dir_all(root.join("audit")).await?;
        Ok(Self { root, strictness })
    }

    fn run_dir(&self, id: RunId) -> PathBuf {
        self.root.join("runs").join(id.to_string())
    }

    async fn write_json<T: Serialize>(&self, path: &Path, record: &T) -> StorageResult<()> {
        let versioned = Versioned {
            version: SCHEMA_VERSION,
            record,
        };
        let body = serde_json::to_vec_pretty(&versioned).map_err(StorageError::serialization)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(&self, path: &Path) -> StorageResult<T> {
        let bytes = fs::read(path).await?;
        let versioned: Versioned<T> = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
        Ok(versioned.record)
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn save_run(&self, run: &Run) -> StorageResult<()> {
        let dir = self.run_dir(run.id);
        fs::create_dir_all(&dir).await?;
        self.write_json(&dir.join("run.json"), run).await
    }

    async fn load_run(&self, id: RunId) -> StorageResult<Run> {
        let path = self.run_dir(id).join("run.json");
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.read_json(&path).await
    }

    async fn save_iteration(&self, record: &IterationRecord) -> StorageResult<()> {
        let dir = self.run_dir(record.run_id);
        fs::create_dir_all(&dir).await?;

        let agent_file = AgentFile {
            run_id: record.run_id,
            iteration: record.iteration,
            started_at: record.started_at,
            ended_at: record.ended_at,
            agent_result: record.agent_result.clone(),
            content_hash: record.content_hash.clone(),
            error: record.error.clone(),
        };
        self.write_json(
            &dir.join(format!("agent-{}.json", record.iteration)),
            &agent_file,
        )
        .await?;

        let verification_file = VerificationFile {
            verification: record.verification.clone(),
            snapshot: record.snapshot.clone(),
        };
        self.write_json(
            &dir.join(format!("verification-{}.json", record.iteration)),
            &verification_file,
        )
        .await
    }

    async fn load_iterations(&self, run_id: RunId) -> StorageResult<Vec<IterationRecord>> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&dir).await?;
        let mut iterations = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("agent-") {
                if let Some(num) = rest.strip_suffix(".json").and_then(|s| s.parse::<u32>().ok()) {
                    iterations.push(num);
                }
            }
        }
        iterations.sort_unstable();

        let mut records = Vec::with_capacity(iterations.len());
        for iteration in iterations {
            let agent_path = dir.join(format!("agent-{iteration}.json"));
            let verification_path = dir.join(format!("verification-{iteration}.json"));

            let agent: AgentFile = match self.read_json(&agent_path).await {
                Ok(a) => a,
                Err(e) => match self.strictness {
                    StrictnessMode::FailFast => return Err(e),
                    StrictnessMode::LogAndSkip => {
                        tracing::warn!(run_id = %run_id, iteration, error = %e, "skipping corrupt agent record");
                        continue;
                    }
                },
            };
            let verification: VerificationFile = if verification_path.exists() {
                match self.read_json(&verification_path).await {
                    Ok(v) => v,
                    Err(e) => match self.strictness {
                        StrictnessMode::FailFast => return Err(e),
                        StrictnessMode::LogAndSkip => {
                            tracing::warn!(run_id = %run_id, iteration, error = %e, "skipping corrupt verification record");
                            VerificationFile { verification: None, snapshot: None }
                        }
                    },
                }
            } else {
                VerificationFile { verification: None, snapshot: None }
            };

            records.push(IterationRecord {
                run_id: agent.run_id,
                iteration: agent.iteration,
                started_at: agent.started_at,
                ended_at: agent.ended_at,
                agent_result: agent.agent_result,
                snapshot: verification.snapshot,
                verification: verification.verification,
                content_hash: agent.content_hash,
                error: agent.error,
            });
        }
        Ok(records)
    }

    async fn list_runs(&self) -> StorageResult<Vec<RunSummary>> {
        let runs_dir = self.root.join("runs");
        let mut entries = fs::read_dir(&runs_dir).await?;
        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let run_json = entry.path().join("run.json");
            if !run_json.exists() {
                continue;
            }
            match self.read_json::<Run>(&run_json).await {
                Ok(run) => summaries.push(RunSummary::from(&run)),
                Err(e) => match self.strictness {
                    StrictnessMode::FailFast => return Err(e),
                    StrictnessMode::LogAndSkip => {
                        tracing::warn!(path = %run_json.display(), error = %e, "skipping corrupt run record");
                    }
                },
            }
        }
        Ok(summaries)
    }

    async fn append_audit(&self, entry: AuditEntry) -> StorageResult<()> {
        let path = self.root.join("audit").join(format!("{}.json", entry.run_id));
        let mut lines = if path.exists() {
            String::from_utf8(fs::read(&path).await?).unwrap_or_default()
        } else {
            String::new()
        };
        lines.push_str(&serde_json::to_string(&entry).map_err(StorageError::serialization)?);
        lines.push('\n');
        fs::write(&path, lines).await?;
        Ok(())
    }
}
