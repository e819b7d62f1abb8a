// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sealteam",
    about = "Multi-agent LLM orchestration: a leader decomposes a goal and spawns workers",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// The goal to hand to the leader agent. Required unless --resume-from
    /// is given.
    #[arg(value_name = "GOAL")]
    pub goal: Option<String>,

    /// Max concurrent workers (clamped to 1..12).
    #[arg(long, env = "SEALTEAM_MAX_AGENTS", default_value_t = 6)]
    pub workers: u32,

    /// Per-agent token budget.
    #[arg(long, env = "SEALTEAM_DEFAULT_BUDGET", default_value_t = 100_000)]
    pub budget: u64,

    /// Per-agent iteration cap.
    #[arg(long, env = "SEALTEAM_DEFAULT_MAX_ITERATIONS", default_value_t = 50)]
    pub max_iterations: u32,

    /// Output root for session artifacts.
    #[arg(long, env = "SEALTEAM_WORKSPACE", default_value = "./workspace")]
    pub workspace: PathBuf,

    /// Message bus endpoint.
    #[arg(long, env = "VALKEY_URL", default_value = "valkey://localhost:6379")]
    pub valkey_url: String,

    /// Leader's LLM model id.
    #[arg(long, env = "SEALTEAM_LEADER_MODEL", default_value = "claude-sonnet-4-5")]
    pub leader_model: String,

    /// Worker LLM model id.
    #[arg(long, env = "SEALTEAM_TEAM_MODEL", default_value = "claude-sonnet-4-5")]
    pub team_model: String,

    /// Recover a session from an existing workspace instead of starting a
    /// fresh one.
    #[arg(long, value_name = "PATH")]
    pub resume_from: Option<PathBuf>,

    /// Path to a config file (overrides auto-discovery).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Internal: run a single agent's life loop from a serialized
    /// `AGENT_CONFIG` environment variable. Spawned by the supervisor and
    /// by the leader's own `spawn` tool; never invoked directly by a user.
    #[command(hide = true)]
    Agent,
}
