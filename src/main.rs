// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Thin wiring binary for manual smoke runs of the MassGen core. This is
//! deliberately not the product CLI/wizard (that surface is out of
//! scope here) — it exists to (a) run one demo turn against deterministic mock
//! backends and print the resulting Status document, and (b) act as the
//! child process the Subagent Gateway spawns via `--subagent`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use massgen_backend::{BackendSession, ScriptedMockSession};
use massgen_config::TurnConfig;
use massgen_gateway::SubagentGateway;
use massgen_hooks::HookManager;
use massgen_orchestrator::{NoSubagents, Orchestrator, StatusWriter, SubagentDispatcher};
use massgen_types::AgentId;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "massgen", about = "MassGen core — multi-agent convergence demo")]
struct Cli {
    /// Number of mock agents to run in demo mode.
    #[arg(long, default_value_t = 3)]
    agents: usize,

    /// The user question posed to the demo turn.
    #[arg(long, default_value = "What is the answer to life, the universe, and everything?")]
    question: String,

    /// Explicit TOML config layer, merged over the discovered defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the turn's Status document and subagent trees are
    /// written under. Defaults to a timestamp-free `./massgen-run`.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Run as a subagent child process: execute one bounded turn for
    /// `--task` and exit, instead of the interactive demo. This is the
    /// mode `massgen-gateway::SubagentGateway` invokes recursively.
    #[arg(long)]
    subagent: bool,

    /// The task text a subagent child runs the turn against (required
    /// with `--subagent`).
    #[arg(long)]
    task: Option<String>,

    /// Where the subagent child writes its Status document. Defaults to
    /// `<workdir>/status.json`.
    #[arg(long)]
    status_path: Option<PathBuf>,

    /// Nesting depth this process is running at, used to bound further
    /// `spawn_subagents` calls it might make.
    #[arg(long, default_value_t = 0)]
    depth: u32,

    /// Re-run with the prior attempt's answer as additional context
    /// instead of starting fresh.
    #[arg(long)]
    refine: bool,

    /// Increase log verbosity (-v debug, -vv trace); default is warn.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(massgen_config::load(cli.config.as_deref())?);
    let workdir = cli.workdir.clone().unwrap_or_else(|| PathBuf::from("massgen-run"));

    if cli.subagent {
        run_subagent(&cli, config, &workdir).await
    } else {
        run_demo(&cli, config, &workdir).await
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn dispatcher(config: &TurnConfig, depth: u32, workdir: &std::path::Path) -> Arc<dyn SubagentDispatcher> {
    if depth >= config.subagents.max_depth {
        return Arc::new(NoSubagents);
    }
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("massgen"));
    Arc::new(SubagentGateway::new(
        config.subagents.clone(),
        depth,
        workdir.to_path_buf(),
        exe,
    ))
}

/// Build one agent per `tasks[i]`: the first agent proposes an answer,
/// every other agent votes for it once it sees the first agent's
/// anonymized id (`agent1`, assigned in join order at turn start). This
/// mirrors a two-agent converge-on-vote scenario for any agent count,
/// without requiring a real model backend.
fn build_demo_agents(count: usize, question: &str) -> Vec<(AgentId, Arc<dyn BackendSession>)> {
    (0..count.max(1))
        .map(|i| {
            let backend: Arc<dyn BackendSession> = if i == 0 {
                Arc::new(ScriptedMockSession::tool_then_text(
                    "call-answer",
                    "new_answer",
                    serde_json::json!({ "text": format!("proposed answer to: {question}") }).to_string(),
                    "answer submitted",
                ))
            } else {
                Arc::new(ScriptedMockSession::tool_then_text(
                    format!("call-vote-{i}"),
                    "vote",
                    r#"{"target":"agent1"}"#,
                    "vote cast",
                ))
            };
            (AgentId::new(), backend)
        })
        .collect()
}

async fn run_demo(cli: &Cli, config: Arc<TurnConfig>, workdir: &std::path::Path) -> anyhow::Result<()> {
    let hooks = Arc::new(HookManager::new(Duration::from_millis(config.hooks.default_timeout_ms)));
    let status_path = workdir.join("status.json");
    let status_writer = Arc::new(StatusWriter::new(status_path.clone(), Duration::from_secs(2)));
    let dispatcher = dispatcher(&config, 0, workdir);

    let mut orchestrator = Orchestrator::new(
        (*config).clone(),
        hooks,
        dispatcher,
        status_writer,
        workdir.join("workspaces"),
    );
    let agents = build_demo_agents(cli.agents, &cli.question);

    let status = orchestrator.run_turn(agents).await.context("running demo turn")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_subagent(cli: &Cli, config: Arc<TurnConfig>, workdir: &std::path::Path) -> anyhow::Result<()> {
    let task = cli
        .task
        .as_deref()
        .context("--subagent requires --task")?;
    tokio::fs::create_dir_all(workdir)
        .await
        .with_context(|| format!("creating subagent workdir {}", workdir.display()))?;

    let hooks = Arc::new(HookManager::new(Duration::from_millis(config.hooks.default_timeout_ms)));
    let status_path = cli.status_path.clone().unwrap_or_else(|| workdir.join("status.json"));
    let status_writer = Arc::new(StatusWriter::new(status_path, Duration::from_secs(2)));
    let dispatcher = dispatcher(&config, cli.depth, workdir);

    let mut orchestrator = Orchestrator::new(
        (*config).clone(),
        hooks,
        dispatcher,
        status_writer,
        workdir.join("workspaces"),
    );
    // A subagent child runs single-agent: it has no peers to converge
    // with, so its one answer wins as soon as it is submitted.
    let agent = (
        AgentId::new(),
        Arc::new(ScriptedMockSession::tool_then_text(
            "call-answer",
            "new_answer",
            serde_json::json!({ "text": format!("subagent result for: {task}") }).to_string(),
            "done",
        )) as Arc<dyn BackendSession>,
    );

    orchestrator.run_turn(vec![agent]).await.context("running subagent turn")?;
    Ok(())
}
