//! Thin CLI harness: parses a work order from JSON, drives it through a
//! [`RunExecutor`], and prints the resulting run record. Grounded on
//! `main.rs`'s composition-layer style (`Cli::parse` -> build config ->
//! execute -> report); this crate's core has no HTTP or WebSocket
//! surface, so the CLI is the only interactive entry point.

use crate::config::GateConfig;
use crate::events::EventBus;
use crate::model::WorkOrder;
use crate::run_executor::RunExecutor;
use crate::store::file::FileRunStore;
use crate::store::memory::MemoryRunStore;
use crate::store::{RunStore, StrictnessMode};
use crate::strategy::{Fixed, Hybrid, LoopStrategy, Ralph};
use crate::subprocess::{ProcessRegistry, SubprocessAgentDriver};
use crate::testing::mocks::{
    FakeAgentDriver, FakeCiMonitor, FakeFeedbackGenerator, FakeSnapshotter, FakeVerifier, FakeWorkspaceProvisioner,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "agentgate", about = "Control-plane core for driving code-generation agents")]
pub struct Cli {
    /// Path to a TOML config file. Falls back to built-in defaults if absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the state machine's transition table and exit.
    ValidateStateMachine,
    /// Drive a work order through the core using in-memory fake
    /// collaborators, for local exploration of loop-strategy behavior.
    DryRun {
        /// Path to a JSON-encoded `WorkOrder`.
        work_order: PathBuf,
        #[arg(long, value_enum, default_value_t = StrategyArg::Fixed)]
        strategy: StrategyArg,
    },
    /// Drive a work order through the core with a real agent subprocess.
    /// Verification, snapshotting, workspace provisioning, feedback, and CI
    /// polling stay fake collaborators — those are sandbox/git-host/CI
    /// integrations outside this crate's scope.
    Run {
        /// Path to a JSON-encoded `WorkOrder`.
        work_order: PathBuf,
        #[arg(long, value_enum, default_value_t = StrategyArg::Fixed)]
        strategy: StrategyArg,
        /// Program to invoke as the agent, e.g. `claude`.
        #[arg(long)]
        agent_program: String,
        /// Extra arguments passed to the agent program before the task
        /// prompt and `--iteration` flag.
        #[arg(long = "agent-arg")]
        agent_args: Vec<String>,
    },
    /// List runs recorded under a file-store root.
    ListRuns {
        #[arg(long)]
        root: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Fixed,
    Hybrid,
    Ralph,
}

impl StrategyArg {
    fn build(self) -> Box<dyn LoopStrategy> {
        match self {
            StrategyArg::Fixed => Box::new(Fixed),
            StrategyArg::Hybrid => Box::new(Hybrid::new()),
            StrategyArg::Ralph => Box::new(Ralph::new()),
        }
    }
}

/// Resolve config, then dispatch to the requested subcommand. Mirrors
/// `main.rs`'s `AppConfig::new -> initialize_app -> execute_command`
/// pipeline, collapsed into one function since this harness has no
/// persistent app state to initialize beyond the config itself.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => GateConfig::load(path).await?,
        None => GateConfig::default(),
    };

    match cli.command {
        Command::ValidateStateMachine => {
            match crate::state_machine::validate_transition_table() {
                Ok(()) => println!("transition table OK"),
                Err(errors) => {
                    for e in &errors {
                        eprintln!("{e}");
                    }
                    anyhow::bail!("transition table failed validation ({} issue(s))", errors.len());
                }
            }
        }
        Command::DryRun { work_order, strategy } => {
            let body = tokio::fs::read_to_string(&work_order).await?;
            let work_order: WorkOrder = serde_json::from_str(&body)?;

            let executor = RunExecutor {
                store: Arc::new(MemoryRunStore::new()),
                events: Arc::new(EventBus::with_buffer_size(config.event_buffer_size)),
                agent_driver: Arc::new(FakeAgentDriver::new(vec![crate::model::AgentResult {
                    exit_code: Some(0),
                    timed_out: false,
                    tool_call_count: 1,
                    agent_output: "dry-run agent output".into(),
                    stderr_tail: String::new(),
                    stdout_truncated: false,
                }])),
                snapshotter: Arc::new(FakeSnapshotter::new()),
                verifier: Arc::new(FakeVerifier { passed: true }),
                workspace_provisioner: Arc::new(FakeWorkspaceProvisioner { root: std::env::temp_dir() }),
                feedback_generator: Arc::new(FakeFeedbackGenerator),
                ci_monitor: Arc::new(FakeCiMonitor::passed()),
                retry_policy: config.retry_policy.resolve(),
            };
            let (_cancel_tx, cancel_rx) = watch::channel(false);
            let run = executor.execute(work_order, strategy.build(), cancel_rx).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Run { work_order, strategy, agent_program, agent_args } => {
            let body = tokio::fs::read_to_string(&work_order).await?;
            let work_order: WorkOrder = serde_json::from_str(&body)?;

            let events = Arc::new(EventBus::with_buffer_size(config.event_buffer_size));
            let registry = Arc::new(ProcessRegistry::new());
            let agent_driver = Arc::new(SubprocessAgentDriver::new(
                agent_program,
                agent_args,
                work_order.wall_clock_budget,
                Arc::clone(&registry),
                Arc::clone(&events),
            ));

            let executor = RunExecutor {
                store: Arc::new(MemoryRunStore::new()),
                events,
                agent_driver,
                snapshotter: Arc::new(FakeSnapshotter::new()),
                verifier: Arc::new(FakeVerifier { passed: true }),
                workspace_provisioner: Arc::new(FakeWorkspaceProvisioner { root: std::env::temp_dir() }),
                feedback_generator: Arc::new(FakeFeedbackGenerator),
                ci_monitor: Arc::new(FakeCiMonitor::passed()),
                retry_policy: config.retry_policy.resolve(),
            };
            let (_cancel_tx, cancel_rx) = watch::channel(false);
            let run = executor.execute(work_order, strategy.build(), cancel_rx).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::ListRuns { root } => {
            let store = FileRunStore::new(&root, StrictnessMode::LogAndSkip).await?;
            for summary in store.list_runs().await? {
                println!("{} {:?} iteration {}", summary.id, summary.state, summary.iteration);
            }
        }
    }

    Ok(())
}
