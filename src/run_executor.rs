//! Run Executor / Phase Driver (§4.7, component C8): drives one run
//! through the full BUILDING -> SNAPSHOTTING -> VERIFYING -> FEEDBACK /
//! PR_CREATED / CI_POLLING cycle until a terminal state, invoking the
//! Streaming Subprocess Executor indirectly through `AgentDriver`, the
//! Retry Policy Engine, the active Loop Strategy, and the external
//! `Verifier`/`Snapshotter`/`WorkspaceProvisioner`/`FeedbackGenerator`/
//! `CiMonitor`. It is the sole emitter of `TransitionEvent`s — every
//! other component only ever reads `Run::state`.
//!
//! Grounded on `cook/orchestrator/core.rs`'s phase-driven main loop and
//! `cook/execution/mapreduce/phases/coordinator.rs`'s dispatch-by-enum
//! shape.

use crate::error::{GateError, GateErrorKind};
use crate::events::EventBus;
use crate::external::{AgentDriver, CiMonitor, FeedbackGenerator, Snapshotter, Verifier, WorkspaceProvisioner};
use crate::model::{
    AgentResult, BusEventPayload, CancelOrigin, HistoryEntry, IterationRecord, Run, RunId, RunResult, RunResultTag,
    RunState, Snapshot, TransitionEvent, VerificationReport, WorkOrder,
};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::state_machine;
use crate::store::RunStore;
use crate::strategy::{self, Decision, IterationContext, LoopStrategy};
use std::sync::Arc;
use tokio::sync::watch;

pub struct RunExecutor {
    pub store: Arc<dyn RunStore>,
    pub events: Arc<EventBus>,
    pub agent_driver: Arc<dyn AgentDriver>,
    pub snapshotter: Arc<dyn Snapshotter>,
    pub verifier: Arc<dyn Verifier>,
    pub workspace_provisioner: Arc<dyn WorkspaceProvisioner>,
    pub feedback_generator: Arc<dyn FeedbackGenerator>,
    pub ci_monitor: Arc<dyn CiMonitor>,
    pub retry_policy: RetryPolicy,
}

/// Working state for one BUILDING -> SNAPSHOTTING -> VERIFYING pass,
/// carried across the state-dispatch loop until either a terminal event
/// fires or `FEEDBACK_GENERATED` starts the next one.
struct Cycle {
    record: IterationRecord,
    agent_result: Option<AgentResult>,
    snapshot: Option<Snapshot>,
    verification: Option<VerificationReport>,
    content_hash: Option<String>,
    /// Decision computed in VERIFYING, deferred to FEEDBACK so a stateful
    /// strategy (Hybrid's hash window) is only ever consulted once per
    /// cycle. `None` when FEEDBACK is reached via a `CI_FAILED` bounce
    /// instead, in which case FEEDBACK asks the strategy itself.
    pending_decision: Option<Decision>,
}

impl Cycle {
    fn new(run_id: RunId, iteration: u32) -> Self {
        Self {
            record: IterationRecord::new(run_id, iteration),
            agent_result: None,
            snapshot: None,
            verification: None,
            content_hash: None,
            pending_decision: None,
        }
    }
}

impl RunExecutor {
    /// Drive `work_order` from `QUEUED` to a terminal state. `strategy`
    /// decides, after every iteration, whether to loop again; `cancel`
    /// is checked only at the safe checkpoints between phases, never
    /// mid-subprocess (that's the executor's own timeout/cancel path).
    pub async fn execute(
        &self,
        work_order: WorkOrder,
        mut strategy: Box<dyn LoopStrategy>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Run, GateError> {
        let mut run = Run::new(work_order.id, work_order.max_iterations);
        strategy.initialize();
        strategy.on_loop_start();

        self.transition(&mut run, TransitionEvent::Lease).await?;
        self.store.save_run(&run).await.map_err(GateError::from)?;
        self.events.publish(work_order.id, run.id, BusEventPayload::RunStarted);

        let workspace = self
            .workspace_provisioner
            .provision(&work_order.workspace_source)
            .await
            .map_err(|e| GateError::with_source(GateErrorKind::WorkspaceError, "workspace provisioning failed", e))?;

        let outcome = self.drive_loop(&mut run, &work_order, &workspace, strategy.as_mut(), &mut cancel).await;

        let _ = self.workspace_provisioner.teardown(&workspace).await;
        strategy.on_loop_end();

        match &outcome {
            Ok(()) => self.events.publish(work_order.id, run.id, BusEventPayload::RunCompleted),
            Err(e) => self.events.publish(
                work_order.id,
                run.id,
                BusEventPayload::RunFailed { kind: e.kind, message: e.message.clone() },
            ),
        }

        self.store.save_run(&run).await.map_err(GateError::from)?;
        outcome?;
        Ok(run)
    }

    async fn drive_loop(
        &self,
        run: &mut Run,
        work_order: &WorkOrder,
        workspace: &std::path::Path,
        strategy: &mut dyn LoopStrategy,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), GateError> {
        let mut cycle = Cycle::new(run.id, run.iteration);

        loop {
            if run.state.is_terminal() {
                return Ok(());
            }

            if *cancel.borrow() {
                self.transition(run, TransitionEvent::Cancel { origin: CancelOrigin::User }).await?;
                run.result = Some(RunResult::canceled(CancelOrigin::User));
                self.store.save_run(run).await.map_err(GateError::from)?;
                return Ok(());
            }

            match run.state {
                RunState::Leased => {
                    self.transition(run, TransitionEvent::StartBuild).await?;
                    self.store.save_run(run).await.map_err(GateError::from)?;
                }

                RunState::Building => {
                    self.run_building_phase(run, work_order, workspace, &mut cycle).await?;
                    if run.state.is_terminal() {
                        return Ok(());
                    }
                }

                RunState::Snapshotting => {
                    self.run_snapshotting_phase(run, workspace, &mut cycle).await?;
                    if run.state.is_terminal() {
                        return Ok(());
                    }
                }

                RunState::Verifying => {
                    self.run_verifying_phase(run, work_order, strategy, &mut cycle).await?;
                    if run.state.is_terminal() {
                        return Ok(());
                    }
                }

                RunState::Feedback => {
                    self.run_feedback_phase(run, work_order, strategy, &mut cycle).await?;
                    if run.state.is_terminal() {
                        return Ok(());
                    }
                }

                RunState::PrCreated => {
                    if work_order.ci_enabled {
                        self.transition(run, TransitionEvent::StartCiPoll).await?;
                    } else {
                        self.transition(run, TransitionEvent::VerifyPassed).await?;
                        run.result = Some(RunResult::passed());
                    }
                    self.store.save_run(run).await.map_err(GateError::from)?;
                }

                RunState::CiPolling => {
                    self.run_ci_polling_phase(run, &mut cycle).await?;
                    if run.state.is_terminal() {
                        return Ok(());
                    }
                }

                RunState::Queued | RunState::Succeeded | RunState::Failed | RunState::Canceled => {
                    return Err(GateError::system(format!(
                        "run executor reached an unreachable state {:?}",
                        run.state
                    )));
                }
            }
        }
    }

    async fn run_building_phase(
        &self,
        run: &mut Run,
        work_order: &WorkOrder,
        workspace: &std::path::Path,
        cycle: &mut Cycle,
    ) -> Result<(), GateError> {
        let mut retry_state = RetryState::new(self.retry_policy.clone());
        let agent_outcome = loop {
            match self.agent_driver.run_iteration(work_order, workspace, run.id, run.iteration).await {
                Ok(result) => break Ok(result),
                Err(e) => {
                    let kind = classify_driver_error(&e);
                    match retry_state.record_failure(kind, e.to_string()) {
                        RetryDecision::Retry { delay } => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        RetryDecision::Exhausted => {
                            break Err(GateError::with_source(GateErrorKind::SystemError, "agent retries exhausted", e));
                        }
                        RetryDecision::NotRetryable => {
                            break Err(GateError::with_source(kind, e.to_string(), e));
                        }
                    }
                }
            }
        };

        let agent_result = match agent_outcome {
            Ok(r) => r,
            Err(e) => {
                self.transition(run, TransitionEvent::SystemError { kind: e.kind, message: e.message.clone() }).await?;
                run.result = Some(RunResult::failed(RunResultTag::FailedError, e.kind, e.message.clone()));
                cycle.record.error = Some((e.kind, e.message.clone()));
                cycle.record.ended_at = Some(chrono::Utc::now());
                let _ = self.store.save_iteration(&cycle.record).await;
                self.store.save_run(run).await.map_err(GateError::from)?;
                return Ok(());
            }
        };

        cycle.record.agent_result = Some(agent_result.clone());

        if !agent_result.build_succeeded() {
            let kind = if agent_result.timed_out { GateErrorKind::AgentTimeout } else { GateErrorKind::BuildFailed };
            let message = if agent_result.timed_out {
                "agent timed out before exiting".to_string()
            } else {
                format!("agent exited with {:?}", agent_result.exit_code)
            };
            self.transition(run, TransitionEvent::BuildFailed { kind, message: message.clone() }).await?;
            let tag = if agent_result.timed_out { RunResultTag::FailedTimeout } else { RunResultTag::FailedBuild };
            run.result = Some(RunResult::failed(tag, kind, message.clone()));
            cycle.record.error = Some((kind, message));
            cycle.record.ended_at = Some(chrono::Utc::now());
            let _ = self.store.save_iteration(&cycle.record).await;
            self.store.save_run(run).await.map_err(GateError::from)?;
            return Ok(());
        }

        cycle.agent_result = Some(agent_result);
        self.transition(run, TransitionEvent::BuildOk).await?;
        self.store.save_run(run).await.map_err(GateError::from)?;
        Ok(())
    }

    async fn run_snapshotting_phase(
        &self,
        run: &mut Run,
        workspace: &std::path::Path,
        cycle: &mut Cycle,
    ) -> Result<(), GateError> {
        match self.snapshotter.snapshot(workspace).await {
            Ok(snapshot) => {
                cycle.record.snapshot = Some(snapshot.clone());
                cycle.snapshot = Some(snapshot);
                self.transition(run, TransitionEvent::SnapshotOk).await?;
                self.store.save_run(run).await.map_err(GateError::from)?;
                Ok(())
            }
            Err(e) => {
                let kind = GateErrorKind::WorkspaceError;
                let message = format!("snapshot failed: {e}");
                self.transition(run, TransitionEvent::SnapshotFailed { kind, message: message.clone() }).await?;
                run.result = Some(RunResult::failed(RunResultTag::FailedError, kind, message.clone()));
                cycle.record.error = Some((kind, message));
                cycle.record.ended_at = Some(chrono::Utc::now());
                let _ = self.store.save_iteration(&cycle.record).await;
                self.store.save_run(run).await.map_err(GateError::from)?;
                Ok(())
            }
        }
    }

    async fn run_verifying_phase(
        &self,
        run: &mut Run,
        work_order: &WorkOrder,
        strategy: &mut dyn LoopStrategy,
        cycle: &mut Cycle,
    ) -> Result<(), GateError> {
        let snapshot = match cycle.snapshot.clone() {
            Some(s) => s,
            None => return Err(GateError::system("verifying phase reached without a snapshot")),
        };

        let verification = self
            .verifier
            .verify(&work_order.gate_plan, &snapshot)
            .await
            .map_err(|e| GateError::with_source(GateErrorKind::VerificationFailed, "verifier failed", e))?;

        let hash = strategy::content_hash(&snapshot, &verification);
        cycle.record.verification = Some(verification.clone());
        cycle.record.content_hash = Some(hash.clone());
        cycle.record.ended_at = Some(chrono::Utc::now());
        self.store.save_iteration(&cycle.record).await.map_err(GateError::from)?;
        cycle.content_hash = Some(hash.clone());
        cycle.verification = Some(verification.clone());

        if verification.passed {
            if work_order.wants_pr {
                self.transition(run, TransitionEvent::OpenPr).await?;
            } else {
                self.transition(run, TransitionEvent::VerifyPassed).await?;
                run.result = Some(RunResult::passed());
            }
            self.store.save_run(run).await.map_err(GateError::from)?;
            return Ok(());
        }

        let agent_output = cycle.agent_result.as_ref().map(|r| r.agent_output.as_str()).unwrap_or("");
        let ctx = IterationContext {
            iteration: run.iteration,
            max_iterations: run.max_iterations,
            agent_output,
            content_hash: &hash,
            verification_passed: false,
            no_changes: snapshot.files_changed == 0,
            ci_passed: false,
            highest_level_passed: verification.highest_level_passed(),
        };
        let decision = strategy.should_continue(&ctx);
        strategy.on_iteration_end(&ctx);

        match decision {
            Decision::Stop { reason, .. } => {
                self.transition(run, TransitionEvent::VerifyFailedTerminal { kind: GateErrorKind::VerificationFailed, message: reason.clone() }).await?;
                run.result = Some(RunResult::failed(RunResultTag::FailedVerification, GateErrorKind::VerificationFailed, reason));
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
            Decision::Continue => {
                cycle.pending_decision = Some(Decision::Continue);
                self.transition(run, TransitionEvent::VerifyFailedRetryable).await?;
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
        }
        Ok(())
    }

    async fn run_feedback_phase(
        &self,
        run: &mut Run,
        work_order: &WorkOrder,
        strategy: &mut dyn LoopStrategy,
        cycle: &mut Cycle,
    ) -> Result<(), GateError> {
        let agent_output = cycle.agent_result.as_ref().map(|r| r.agent_output.clone()).unwrap_or_default();
        let _ = self
            .feedback_generator
            .generate(work_order, &agent_output, cycle.verification.as_ref())
            .await
            .unwrap_or_default();

        let decision = match cycle.pending_decision.take() {
            Some(d) => d,
            None => {
                // Reached via a CI_FAILED bounce rather than a failed
                // VERIFYING pass: local verification passed (or this is
                // the run's very first feedback cycle), so the strategy
                // hasn't weighed in on this content yet. `verification_passed`
                // is forced false here — CI is the gate that actually
                // failed, and a stop-on-pass criterion shouldn't fire just
                // because the local checks were clean.
                let hash = cycle.content_hash.clone().unwrap_or_default();
                let ctx = IterationContext {
                    iteration: run.iteration,
                    max_iterations: run.max_iterations,
                    agent_output: &agent_output,
                    content_hash: &hash,
                    verification_passed: false,
                    no_changes: false,
                    ci_passed: false,
                    highest_level_passed: cycle.verification.as_ref().and_then(|v| v.highest_level_passed()),
                };
                let d = strategy.should_continue(&ctx);
                strategy.on_iteration_end(&ctx);
                d
            }
        };

        match decision {
            Decision::Stop { reason, .. } => {
                self.transition(run, TransitionEvent::VerifyFailedTerminal { kind: GateErrorKind::VerificationFailed, message: reason.clone() }).await?;
                run.result = Some(RunResult::failed(RunResultTag::FailedVerification, GateErrorKind::VerificationFailed, reason));
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
            Decision::Continue => {
                self.transition(run, TransitionEvent::FeedbackReady).await?;
                run.iteration += 1;
                *cycle = Cycle::new(run.id, run.iteration);
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
        }
        Ok(())
    }

    async fn run_ci_polling_phase(&self, run: &mut Run, cycle: &mut Cycle) -> Result<(), GateError> {
        let ci_ref = cycle.snapshot.as_ref().and_then(|s| s.branch.clone()).unwrap_or_default();
        match self.ci_monitor.wait(&ci_ref).await {
            Ok(poll) if poll.all_passed => {
                self.transition(run, TransitionEvent::CiPassed).await?;
                run.result = Some(RunResult::passed());
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
            Ok(poll) if poll.timed_out => {
                self.transition(run, TransitionEvent::CiTimeout).await?;
                run.result = Some(RunResult::failed(RunResultTag::FailedTimeout, GateErrorKind::AgentTimeout, "CI check suite timed out"));
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
            Ok(_) => {
                self.transition(run, TransitionEvent::CiFailed).await?;
                cycle.pending_decision = None;
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
            Err(e) => {
                let kind = GateErrorKind::GithubError;
                let message = format!("CI poll failed: {e}");
                self.transition(run, TransitionEvent::SystemError { kind, message: message.clone() }).await?;
                run.result = Some(RunResult::failed(RunResultTag::FailedError, kind, message));
                self.store.save_run(run).await.map_err(GateError::from)?;
            }
        }
        Ok(())
    }

    async fn transition(&self, run: &mut Run, event: TransitionEvent) -> Result<(), GateError> {
        let from = run.state;
        let to = state_machine::apply(from, &event)
            .map_err(|e| GateError::illegal_transition(e.to_string()))?;
        run.state = to;
        run.updated_at = chrono::Utc::now();
        run.history.push(HistoryEntry { from, to, at: run.updated_at });
        self.events.publish(run.work_order_id, run.id, BusEventPayload::StateTransition { from, to });
        Ok(())
    }
}

fn classify_driver_error(_e: &anyhow::Error) -> GateErrorKind {
    GateErrorKind::SystemError
}
