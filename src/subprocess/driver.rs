//! Concrete `AgentDriver` (§4.7/§4.8) wiring the Streaming Subprocess
//! Executor and Process Registry together into one invocable collaborator.
//! Every other external trait in `external.rs` stays an unimplemented seam
//! for the embedding deployment to fill in; this is the one the core ships
//! a real implementation of, since it's built entirely from C3/C4
//! machinery already in this crate.

use super::executor::{StreamingSubprocessExecutor, SubprocessSpec};
use super::registry::{ProcessKey, ProcessRegistry};
use super::sanitized_env;
use crate::events::EventBus;
use crate::external::AgentDriver;
use crate::model::{AgentResult, RunId, WorkOrder};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Invokes `program` (plus `extra_args`, the task prompt, and an
/// `--iteration N` flag) as the agent child process for each iteration,
/// publishing its streamed output on `events` and registering it with
/// `registry` so a caller holding the matching [`ProcessKey`] can cancel
/// it mid-run.
pub struct SubprocessAgentDriver {
    executor: StreamingSubprocessExecutor,
    registry: Arc<ProcessRegistry>,
    events: Arc<EventBus>,
    program: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl SubprocessAgentDriver {
    pub fn new(
        program: impl Into<String>,
        extra_args: Vec<String>,
        timeout: Duration,
        registry: Arc<ProcessRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            executor: StreamingSubprocessExecutor::new(),
            registry,
            events,
            program: program.into(),
            extra_args,
            timeout,
        }
    }
}

#[async_trait]
impl AgentDriver for SubprocessAgentDriver {
    async fn run_iteration(
        &self,
        work_order: &WorkOrder,
        workspace: &Path,
        run_id: RunId,
        iteration: u32,
    ) -> anyhow::Result<AgentResult> {
        let key = ProcessKey { work_order_id: work_order.id, run_id };

        // Registered before spawn with a placeholder pid: the real one
        // only exists once `executor.run` has actually forked, but a
        // caller needs a cancel receiver it can hold onto from the start.
        let cancel_rx = self.registry.register_pending(key);

        let (pid_tx, pid_rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        let pid_task = tokio::spawn(async move {
            if let Ok(pid) = pid_rx.await {
                registry.update_pid(key, pid);
            }
        });

        let mut args = self.extra_args.clone();
        args.push(work_order.task_prompt.clone());
        args.push("--iteration".into());
        args.push(iteration.to_string());

        let spec = SubprocessSpec {
            program: self.program.clone(),
            args,
            cwd: workspace.to_path_buf(),
            env: sanitized_env(work_order, &std::env::vars().collect::<Vec<_>>()),
            timeout: self.timeout,
        };

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let events = Arc::clone(&self.events);
        let work_order_id = work_order.id;
        let forward_task = tokio::spawn(async move {
            while let Some(payload) = event_rx.recv().await {
                events.publish(work_order_id, run_id, payload);
            }
        });

        let result = self.executor.run(spec, event_tx, cancel_rx, Some(pid_tx)).await;

        self.registry.unregister(key);
        let _ = pid_task.await;
        let _ = forward_task.await;

        result.map_err(anyhow::Error::from)
    }
}
