//! AgentGate CLI entry point.
//!
//! Thin composition layer: parse arguments, set up logging, dispatch to
//! `cli::run`, report fatal errors. Mirrors `main.rs`'s
//! parse -> initialize -> execute -> handle-errors shape.

use agentgate::cli::{run, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "agentgate exited with an error");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
