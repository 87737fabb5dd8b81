//! End-to-end scenarios driving a `RunExecutor` through the full
//! lifecycle with fake collaborators, mirroring the testable-property
//! scenarios in SPEC_FULL.md §8: a clean pass, iterative convergence,
//! budget exhaustion, cancellation, the PR/CI path, and file-store
//! persistence across iterations.

use agentgate::config::GateConfig;
use agentgate::events::EventBus;
use agentgate::model::{
    AgentResult, BillingMode, GatePlan, Policies, RunState, WorkOrder, WorkOrderId, WorkspaceId, WorkspaceSource,
};
use agentgate::retry::RetryPolicy;
use agentgate::run_executor::RunExecutor;
use agentgate::store::file::FileRunStore;
use agentgate::store::memory::MemoryRunStore;
use agentgate::store::{RunStore, StrictnessMode};
use agentgate::strategy::{Fixed, Hybrid};
use agentgate::testing::mocks::{
    FakeAgentDriver, FakeCiMonitor, FakeFeedbackGenerator, FakeSnapshotter, FakeVerifier, FakeWorkspaceProvisioner,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn base_work_order(max_iterations: u32) -> WorkOrder {
    WorkOrder {
        id: WorkOrderId::new(),
        workspace_id: WorkspaceId::new(),
        task_prompt: "add the missing null check".into(),
        workspace_source: WorkspaceSource::default(),
        gate_plan: GatePlan::default(),
        policies: Policies::default(),
        max_iterations,
        wall_clock_budget: Duration::from_secs(600),
        billing_mode: BillingMode::ApiKey,
        wants_pr: false,
        ci_enabled: false,
    }
}

fn agent_result(output: &str) -> AgentResult {
    AgentResult {
        exit_code: Some(0),
        timed_out: false,
        tool_call_count: 3,
        agent_output: output.into(),
        stderr_tail: String::new(),
        stdout_truncated: false,
    }
}

struct Harness {
    executor: RunExecutor,
}

impl Harness {
    fn new(scripted: Vec<AgentResult>, verifier_passes: bool) -> Self {
        Self {
            executor: RunExecutor {
                store: Arc::new(MemoryRunStore::new()),
                events: Arc::new(EventBus::new()),
                agent_driver: Arc::new(FakeAgentDriver::new(scripted)),
                snapshotter: Arc::new(FakeSnapshotter::new()),
                verifier: Arc::new(FakeVerifier { passed: verifier_passes }),
                workspace_provisioner: Arc::new(FakeWorkspaceProvisioner { root: std::env::temp_dir() }),
                feedback_generator: Arc::new(FakeFeedbackGenerator),
                ci_monitor: Arc::new(FakeCiMonitor::passed()),
                retry_policy: RetryPolicy::none(),
            },
        }
    }
}

#[tokio::test]
async fn clean_pass_on_the_first_iteration_succeeds_immediately() {
    let harness = Harness::new(vec![agent_result("added the null check")], true);
    let (_tx, rx) = watch::channel(false);
    let run = harness.executor.execute(base_work_order(5), Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Succeeded);
    assert_eq!(run.iteration, 0);
    assert!(run.result.unwrap().succeeded());
    assert_eq!(run.history.first().unwrap().to, RunState::Leased);
}

#[tokio::test]
async fn pr_requested_run_lands_on_succeeded_via_pr_created() {
    let harness = Harness::new(vec![agent_result("ready for review")], true);
    let mut work_order = base_work_order(3);
    work_order.wants_pr = true;
    let (_tx, rx) = watch::channel(false);
    let run = harness.executor.execute(work_order, Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Succeeded);
    assert!(run.history.iter().any(|h| h.to == RunState::PrCreated));
}

#[tokio::test]
async fn ci_enabled_pr_run_passes_through_ci_polling() {
    let harness = Harness::new(vec![agent_result("ready for ci")], true);
    let mut work_order = base_work_order(3);
    work_order.wants_pr = true;
    work_order.ci_enabled = true;
    let (_tx, rx) = watch::channel(false);
    let run = harness.executor.execute(work_order, Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Succeeded);
    assert!(run.history.iter().any(|h| h.to == RunState::CiPolling));
}

#[tokio::test]
async fn exhausting_the_iteration_budget_without_passing_fails_the_run() {
    let harness = Harness::new(vec![agent_result("still trying")], false);
    let (_tx, rx) = watch::channel(false);
    let run = harness.executor.execute(base_work_order(2), Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Failed);
    let result = run.result.unwrap();
    assert!(!result.succeeded());
    assert_eq!(run.iteration, 1, "budget exhaustion should fire on the last allowed iteration");
}

#[tokio::test]
async fn hybrid_strategy_stops_early_on_repeated_identical_output() {
    // Same output every iteration hashes identically, so Hybrid's
    // stall detector should fire well before the 20-iteration budget.
    let harness = Harness::new(vec![agent_result("no progress made")], false);
    let (_tx, rx) = watch::channel(false);
    let run = harness
        .executor
        .execute(base_work_order(20), Box::new(Hybrid::new()), rx)
        .await
        .unwrap();

    assert_eq!(run.state, RunState::Failed);
    assert!(run.iteration < 19, "stall detection should cut the run short of the full budget");
}

#[tokio::test]
async fn cancelling_before_execution_starts_yields_a_canceled_run() {
    let harness = Harness::new(vec![agent_result("x")], false);
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let run = harness.executor.execute(base_work_order(5), Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Canceled);
}

#[tokio::test]
async fn file_store_round_trips_a_multi_iteration_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileRunStore::new(dir.path(), StrictnessMode::FailFast).await.unwrap());
    let executor = RunExecutor {
        store: store.clone(),
        events: Arc::new(EventBus::new()),
        agent_driver: Arc::new(FakeAgentDriver::new(vec![agent_result("attempt one"), agent_result("attempt two, passes")])),
        snapshotter: Arc::new(FakeSnapshotter::new()),
        verifier: Arc::new(FakeVerifier { passed: false }),
        workspace_provisioner: Arc::new(FakeWorkspaceProvisioner { root: std::env::temp_dir() }),
        feedback_generator: Arc::new(FakeFeedbackGenerator),
        ci_monitor: Arc::new(FakeCiMonitor::passed()),
        retry_policy: RetryPolicy::none(),
    };
    let (_tx, rx) = watch::channel(false);
    let run = executor.execute(base_work_order(2), Box::new(Fixed), rx).await.unwrap();

    let reloaded = store.load_run(run.id).await.unwrap();
    assert_eq!(reloaded.state, run.state);

    let iterations = store.load_iterations(run.id).await.unwrap();
    assert!(!iterations.is_empty());
    assert!(iterations.iter().all(|r| r.agent_result.is_some()));
}

#[tokio::test]
async fn ci_timeout_fails_the_run_even_though_verification_passed() {
    let executor = RunExecutor {
        store: Arc::new(MemoryRunStore::new()),
        events: Arc::new(EventBus::new()),
        agent_driver: Arc::new(FakeAgentDriver::new(vec![agent_result("ready for ci")])),
        snapshotter: Arc::new(FakeSnapshotter::new()),
        verifier: Arc::new(FakeVerifier { passed: true }),
        workspace_provisioner: Arc::new(FakeWorkspaceProvisioner { root: std::env::temp_dir() }),
        feedback_generator: Arc::new(FakeFeedbackGenerator),
        ci_monitor: Arc::new(FakeCiMonitor::timed_out()),
        retry_policy: RetryPolicy::none(),
    };
    let mut work_order = base_work_order(3);
    work_order.wants_pr = true;
    work_order.ci_enabled = true;
    let (_tx, rx) = watch::channel(false);
    let run = executor.execute(work_order, Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Failed);
    assert!(!run.result.unwrap().succeeded());
}

#[tokio::test]
async fn ci_failure_bounces_back_to_feedback_and_eventually_exhausts_the_budget() {
    let executor = RunExecutor {
        store: Arc::new(MemoryRunStore::new()),
        events: Arc::new(EventBus::new()),
        agent_driver: Arc::new(FakeAgentDriver::new(vec![agent_result("ready for ci")])),
        snapshotter: Arc::new(FakeSnapshotter::new()),
        verifier: Arc::new(FakeVerifier { passed: true }),
        workspace_provisioner: Arc::new(FakeWorkspaceProvisioner { root: std::env::temp_dir() }),
        feedback_generator: Arc::new(FakeFeedbackGenerator),
        ci_monitor: Arc::new(FakeCiMonitor::failed()),
        retry_policy: RetryPolicy::none(),
    };
    let mut work_order = base_work_order(2);
    work_order.wants_pr = true;
    work_order.ci_enabled = true;
    let (_tx, rx) = watch::channel(false);
    let run = executor.execute(work_order, Box::new(Fixed), rx).await.unwrap();

    assert_eq!(run.state, RunState::Failed);
    assert!(run.history.iter().any(|h| h.to == RunState::CiPolling));
    assert!(run.history.iter().any(|h| h.to == RunState::Feedback));
}

#[tokio::test]
async fn default_config_round_trips_through_toml() {
    let config = GateConfig::default();
    let serialized = toml::to_string(&config).unwrap();
    let reloaded: GateConfig = toml::from_str(&serialized).unwrap();
    assert_eq!(reloaded.queue_capacity, config.queue_capacity);
}
