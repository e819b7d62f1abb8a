// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use sealteam_config::{AgentConfig, Config};
use sealteam_queue::{QueueBackend, RedisQueueBackend};
use sealteam_supervisor::{Supervisor, SupervisorOptions};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("sealteam: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Agent) => run_agent().await,
        None => run_supervisor(cli).await,
    }
}

/// Entry point for a single agent subprocess: the supervisor spawns the
/// leader this way, and the leader's `spawn` tool spawns every worker this
/// way, each with its own `AgentConfig` serialized into `AGENT_CONFIG`.
async fn run_agent() -> anyhow::Result<()> {
    let raw = std::env::var("AGENT_CONFIG").context("`agent` subcommand requires AGENT_CONFIG")?;
    let agent: AgentConfig = serde_json::from_str(&raw).context("parsing AGENT_CONFIG")?;
    init_agent_logging(&agent)?;

    let session = sealteam_config::load(None).unwrap_or_default();
    let life_loop = sealteam_bootstrap::AgentBuilder::new(agent, session).build().await?;
    life_loop.run().await
}

/// Entry point for the supervisor: bootstraps a fresh session or resumes an
/// existing one, then drives the monitor loop until the session ends.
async fn run_supervisor(cli: Cli) -> anyhow::Result<()> {
    init_supervisor_logging(cli.verbose);

    let session: Config = sealteam_config::load(cli.config.as_deref())?;
    if std::env::var(&session.model.api_key_env).is_err() {
        anyhow::bail!("missing required env var `{}`", session.model.api_key_env);
    }

    let binary_path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("sealteam"));
    let opts = SupervisorOptions {
        goal: cli.goal.clone().unwrap_or_default(),
        workers: cli.workers,
        budget: cli.budget,
        max_iterations: cli.max_iterations,
        workspace: cli.workspace.clone(),
        queue_url: cli.valkey_url.clone(),
        leader_model: cli.leader_model.clone(),
        team_model: cli.team_model.clone(),
        binary_path,
        resume_from: cli.resume_from.clone(),
    };

    let queue: Arc<dyn QueueBackend> = Arc::new(
        RedisQueueBackend::connect(&opts.queue_url)
            .await
            .with_context(|| format!("connecting to message bus at {}", opts.queue_url))?,
    );

    let supervisor = if opts.resume_from.is_some() {
        Supervisor::resume(opts, queue).await?
    } else {
        if cli.goal.is_none() {
            anyhow::bail!("a goal is required unless --resume-from is given");
        }
        Supervisor::bootstrap(opts, queue).await?
    };

    supervisor.run().await
}

fn init_supervisor_logging(verbosity: u8) {
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

/// Per-agent plain-text log at `<workspace>/logs/<name>.log`, matching the
/// documented filesystem layout. Mirrors the teacher's file-sink pattern
/// for non-interactive runs, minus the TUI-corruption concern that doesn't
/// apply here.
fn init_agent_logging(agent: &AgentConfig) -> anyhow::Result<()> {
    let log_dir = agent.workspace.join("logs");
    std::fs::create_dir_all(&log_dir).with_context(|| format!("creating {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("{}.log", agent.name));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
        .with(filter)
        .try_init();
    Ok(())
}
