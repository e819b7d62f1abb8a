// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Leader subprocess spawning and pid liveness checks. Worker subprocesses
//! are spawned by the leader's own `spawn` tool and are never directly
//! held by the supervisor as a [`tokio::process::Child`] — they are only
//! ever adopted back via the pid recorded in `SessionState`.

use std::path::Path;
use std::process::Stdio;

use sealteam_config::{AgentConfig, AgentRole};

use crate::options::SupervisorOptions;

pub const LEADER_NAME: &str = "bob";
pub const MAIN_ADDRESS: &str = "main";

/// The leader's `AgentConfig`: allowed tool set, budget, and iteration cap
/// per the supervisor startup sequence.
pub fn leader_config(opts: &SupervisorOptions) -> AgentConfig {
    AgentConfig {
        name: LEADER_NAME.to_string(),
        role: AgentRole::Leader,
        purpose: opts.goal.clone(),
        allowed_tools: vec![
            "spawn".into(),
            "send".into(),
            "git".into(),
            "read_file".into(),
            "write_file".into(),
            "edit_file".into(),
            "list_dir".into(),
            "glob".into(),
            "grep".into(),
            "shell".into(),
            "web_fetch".into(),
            "web_search".into(),
            "create-tool".into(),
        ],
        model: opts.leader_model.clone(),
        token_budget: opts.budget * 2,
        max_iterations: opts.max_iterations,
        max_tool_turns: 75,
        workspace: opts.workspace.clone(),
        queue_url: opts.queue_url.clone(),
    }
}

/// Spawn the `sealteam agent` subprocess for `config`, optionally resuming
/// from a prior `iteration-step` checkpoint. Detached into its own session
/// so it survives the supervisor's own controlling terminal going away;
/// the supervisor still tracks it explicitly via the returned [`Child`].
pub fn spawn_agent(
    binary_path: &Path,
    config: &AgentConfig,
    resume_from: Option<&str>,
) -> anyhow::Result<tokio::process::Child> {
    let payload = serde_json::to_string(config)?;
    let mut cmd = tokio::process::Command::new(binary_path);
    cmd.arg("agent").env("AGENT_CONFIG", payload);
    if let Some(r) = resume_from {
        cmd.env("RESUME_FROM", r);
    }
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    Ok(cmd.spawn()?)
}

/// Probe whether `pid` is still alive, without reaping it (signal 0).
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn pid_is_alive(_pid: u32) -> bool {
    true
}

/// Send SIGTERM to `pid`, ignoring errors for pids that already exited.
#[cfg(unix)]
pub fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) {}

/// Send SIGKILL to `pid`, ignoring errors for pids that already exited.
#[cfg(unix)]
pub fn kill(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub fn kill(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn opts() -> SupervisorOptions {
        SupervisorOptions {
            goal: "ship the feature".into(),
            workers: 6,
            budget: 100_000,
            max_iterations: 50,
            workspace: PathBuf::from("/tmp/ws"),
            queue_url: "valkey://localhost:6379".into(),
            leader_model: "claude-sonnet-4-5".into(),
            team_model: "claude-haiku-4-5".into(),
            binary_path: PathBuf::from("/usr/local/bin/sealteam"),
            resume_from: None,
        }
    }

    #[test]
    fn leader_config_doubles_worker_budget() {
        let cfg = leader_config(&opts());
        assert_eq!(cfg.token_budget, 200_000);
        assert_eq!(cfg.name, "bob");
        assert_eq!(cfg.max_tool_turns, 75);
        assert!(cfg.allowed_tools.contains(&"spawn".to_string()));
    }

    #[test]
    fn current_process_pid_is_alive() {
        assert!(pid_is_alive(std::process::id()));
    }

    #[test]
    fn implausible_pid_is_not_alive() {
        // PIDs this large are never valid on a real system; kill(pid, 0)
        // reliably reports ESRCH.
        assert!(!pid_is_alive(u32::MAX - 1));
    }
}
