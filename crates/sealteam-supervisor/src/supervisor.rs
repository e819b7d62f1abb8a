// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The supervisor: owns the leader subprocess, runs the monitor loop, and
//! handles graceful shutdown. One supervisor per session; the binary's
//! `agent` subcommand is a separate, much simpler entry point that just
//! drives a single [`sealteam_core::LifeLoop`].

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;
use tracing::{info, warn};

use sealteam_queue::{MessageType, QueueBackend, QueueMessage};
use sealteam_state::{AgentSessionEntry, AgentStatus, SessionState, SessionStatus, Step};

use crate::options::SupervisorOptions;
use crate::process::{self, LEADER_NAME, MAIN_ADDRESS};

const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One subprocess the supervisor itself spawned and holds a live handle to.
/// Workers spawned by the leader's `spawn` tool are never held this way —
/// they're tracked only through `SessionState` pids.
struct Tracked {
    child: tokio::process::Child,
}

pub struct Supervisor {
    opts: SupervisorOptions,
    queue: Arc<dyn QueueBackend>,
    tracked: HashMap<String, Tracked>,
    shutting_down: bool,
}

impl Supervisor {
    /// Fresh-session startup: steps 1-6 of the startup sequence. `queue`
    /// must already be connected; `FlushAll` happens here.
    pub async fn bootstrap(opts: SupervisorOptions, queue: Arc<dyn QueueBackend>) -> anyhow::Result<Self> {
        ensure_workspace(&opts.workspace, LEADER_NAME).await?;
        sealteam_queue::flush_all(queue.as_ref())
            .await
            .context("flushing message bus at startup")?;

        let mut session = SessionState {
            goal: opts.goal.clone(),
            start_time: chrono::Utc::now(),
            workspace: opts.workspace.clone(),
            queue_url: opts.queue_url.clone(),
            status: SessionStatus::Running,
            agents: Vec::new(),
        };

        let leader_cfg = process::leader_config(&opts);
        let child = process::spawn_agent(&opts.binary_path, &leader_cfg, None)
            .context("spawning leader subprocess")?;
        let pid = child.id().context("leader exited before its pid was available")?;

        session.agents.push(AgentSessionEntry {
            config: leader_cfg,
            pid,
            status: AgentStatus::Running,
            start_time: chrono::Utc::now(),
            end_time: None,
        });
        sealteam_state::write_session_state(&opts.workspace, &session).await?;

        let task = QueueMessage::new("supervisor", LEADER_NAME, MessageType::Task, opts.goal.clone());
        sealteam_queue::send(queue.as_ref(), task, Some(&opts.workspace)).await?;

        let mut tracked = HashMap::new();
        tracked.insert(LEADER_NAME.to_string(), Tracked { child });

        info!(pid, workspace = %opts.workspace.display(), "supervisor started leader");
        Ok(Self { opts, queue, tracked, shutting_down: false })
    }

    /// Explicit resume flow: reload a prior session, skip agents that are
    /// already done, probe the rest for liveness, and respawn the dead
    /// ones from their last completed step.
    pub async fn resume(opts: SupervisorOptions, queue: Arc<dyn QueueBackend>) -> anyhow::Result<Self> {
        let resume_dir = opts
            .resume_from
            .clone()
            .context("resume() requires SupervisorOptions.resume_from")?;
        let mut session = sealteam_state::read_session_state(&resume_dir)
            .await
            .context("reading session state to resume")?
            .context("no session.json found at the resume path")?;

        let mut tracked = HashMap::new();
        for entry in &mut session.agents {
            if matches!(entry.status, AgentStatus::Completed | AgentStatus::Cancelled) {
                continue;
            }
            if process::pid_is_alive(entry.pid) {
                // Still running: nothing to do, the monitor loop will pick
                // it back up by name via SessionState.
                continue;
            }
            let agent_dir = entry.config.workspace.join(&entry.config.name);
            let resume_from = resume_from_arg(&agent_dir).await?;
            let child = process::spawn_agent(&opts.binary_path, &entry.config, resume_from.as_deref())
                .with_context(|| format!("respawning '{}'", entry.config.name))?;
            entry.pid = child.id().with_context(|| format!("'{}' exited before its pid was available", entry.config.name))?;
            entry.status = AgentStatus::Running;
            if entry.config.name == LEADER_NAME {
                tracked.insert(entry.config.name.clone(), Tracked { child });
            } else {
                std::mem::drop(child);
            }
        }
        sealteam_state::write_session_state(&resume_dir, &session).await?;

        let mut opts = opts;
        opts.workspace = resume_dir;
        Ok(Self { opts, queue, tracked, shutting_down: false })
    }

    /// Run the monitor loop until the session completes or every tracked
    /// subprocess exits, installing SIGINT/SIGTERM handling for graceful
    /// shutdown along the way.
    pub async fn run(mut self) -> anyhow::Result<()> {
        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        #[cfg(unix)]
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

        let mut reconcile = tokio::time::interval(RECONCILE_INTERVAL);

        loop {
            if self.tracked.is_empty() && !self.shutting_down {
                break;
            }

            #[cfg(unix)]
            tokio::select! {
                _ = sigterm.recv() => { self.begin_shutdown().await?; }
                _ = sigint.recv() => { self.begin_shutdown().await?; }
                msg = sealteam_queue::receive(self.queue.as_ref(), MAIN_ADDRESS, 5) => {
                    if let Some(done) = self.handle_main_message(msg).await? {
                        if done {
                            break;
                        }
                    }
                }
                _ = reconcile.tick() => { self.reconcile().await?; }
            }

            #[cfg(not(unix))]
            tokio::select! {
                _ = tokio::signal::ctrl_c() => { self.begin_shutdown().await?; }
                msg = sealteam_queue::receive(self.queue.as_ref(), MAIN_ADDRESS, 5) => {
                    if let Some(done) = self.handle_main_message(msg).await? {
                        if done {
                            break;
                        }
                    }
                }
                _ = reconcile.tick() => { self.reconcile().await?; }
            }

            if self.shutting_down {
                self.finish_shutdown().await?;
                break;
            }
        }
        Ok(())
    }

    async fn handle_main_message(
        &mut self,
        msg: Result<Option<QueueMessage>, sealteam_queue::QueueError>,
    ) -> anyhow::Result<Option<bool>> {
        match msg {
            Ok(Some(m)) if m.message_type == MessageType::AllComplete => {
                info!("received all-complete, waiting for tracked subprocesses to exit");
                self.await_tracked().await;
                self.mark_session_status(SessionStatus::Completed).await?;
                Ok(Some(true))
            }
            Ok(Some(m)) => {
                info!(from = %m.from, message_type = ?m.message_type, "main channel message");
                Ok(Some(false))
            }
            Ok(None) => Ok(Some(false)),
            Err(e) => {
                warn!(error = %e, "receive on main channel failed");
                Ok(Some(false))
            }
        }
    }

    async fn await_tracked(&mut self) {
        for (name, tracked) in self.tracked.iter_mut() {
            match tracked.child.wait().await {
                Ok(status) => info!(name, ?status, "tracked subprocess exited"),
                Err(e) => warn!(name, error = %e, "waiting for tracked subprocess failed"),
            }
        }
        self.tracked.clear();
    }

    /// Reap any tracked subprocess that has already exited; respawn it
    /// with `RESUME_FROM` unless it finished in a completed reflect state.
    /// Then reconcile `SessionState.agents` against pid liveness for any
    /// leader-spawned worker the supervisor never held a `Child` for.
    async fn reconcile(&mut self) -> anyhow::Result<()> {
        let mut exited = Vec::new();
        for (name, tracked) in self.tracked.iter_mut() {
            if let Ok(Some(status)) = tracked.child.try_wait() {
                exited.push((name.clone(), status.success()));
            }
        }

        let Some(mut session) = sealteam_state::read_session_state(&self.opts.workspace).await? else {
            return Ok(());
        };

        for (name, exited_zero) in exited {
            self.tracked.remove(&name);
            let Some(entry) = session.agents.iter_mut().find(|a| a.config.name == name) else {
                continue;
            };
            let agent_dir = entry.config.workspace.join(&entry.config.name);
            let last = sealteam_state::last_completed_step(&agent_dir).await?;
            let finished = matches!(last, Some((_, Step::Reflect)));

            if exited_zero {
                entry.status = AgentStatus::Completed;
                entry.end_time = Some(chrono::Utc::now());
                if name == LEADER_NAME {
                    session.status = SessionStatus::Completed;
                }
            } else if finished {
                entry.status = AgentStatus::Completed;
                entry.end_time = Some(chrono::Utc::now());
            } else {
                let resume_from = last.map(|(i, step)| format!("{i}-{}", step.as_file_fragment()));
                match process::spawn_agent(&self.opts.binary_path, &entry.config, resume_from.as_deref()) {
                    Ok(child) => {
                        if let Some(pid) = child.id() {
                            entry.pid = pid;
                            entry.status = AgentStatus::Running;
                            if name == LEADER_NAME {
                                self.tracked.insert(name.clone(), Tracked { child });
                            } else {
                                std::mem::drop(child);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(name, error = %e, "failed to respawn dead subprocess");
                        entry.status = AgentStatus::Failed;
                        entry.end_time = Some(chrono::Utc::now());
                    }
                }
            }
        }

        // Leader-spawned workers: the supervisor never held their `Child`,
        // so liveness is probed by pid only.
        for entry in session.agents.iter_mut() {
            if entry.config.name == LEADER_NAME || entry.status != AgentStatus::Running {
                continue;
            }
            if !process::pid_is_alive(entry.pid) {
                let agent_dir = entry.config.workspace.join(&entry.config.name);
                let last = sealteam_state::last_completed_step(&agent_dir).await?;
                if matches!(last, Some((_, Step::Reflect))) {
                    entry.status = AgentStatus::Completed;
                } else {
                    let resume_from = last.map(|(i, step)| format!("{i}-{}", step.as_file_fragment()));
                    match process::spawn_agent(&self.opts.binary_path, &entry.config, resume_from.as_deref()) {
                        Ok(child) => {
                            if let Some(pid) = child.id() {
                                entry.pid = pid;
                            }
                            std::mem::drop(child);
                        }
                        Err(e) => {
                            warn!(name = %entry.config.name, error = %e, "failed to respawn dead worker");
                            entry.status = AgentStatus::Failed;
                        }
                    }
                }
                entry.end_time = Some(chrono::Utc::now());
            }
        }

        session.status = session.derive_status();
        sealteam_state::write_session_state(&self.opts.workspace, &session).await?;
        Ok(())
    }

    async fn mark_session_status(&self, status: SessionStatus) -> anyhow::Result<()> {
        if let Some(mut session) = sealteam_state::read_session_state(&self.opts.workspace).await? {
            session.status = status;
            sealteam_state::write_session_state(&self.opts.workspace, &session).await?;
        }
        Ok(())
    }

    async fn begin_shutdown(&mut self) -> anyhow::Result<()> {
        if self.shutting_down {
            return Ok(());
        }
        self.shutting_down = true;
        warn!("shutdown signal received, terminating tracked and session agents");

        for tracked in self.tracked.values() {
            if let Some(pid) = tracked.child.id() {
                process::terminate(pid);
            }
        }
        if let Some(session) = sealteam_state::read_session_state(&self.opts.workspace).await? {
            for entry in &session.agents {
                if entry.status == AgentStatus::Running {
                    process::terminate(entry.pid);
                }
            }
        }
        Ok(())
    }

    async fn finish_shutdown(&mut self) -> anyhow::Result<()> {
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        for tracked in self.tracked.values() {
            if let Some(pid) = tracked.child.id() {
                if process::pid_is_alive(pid) {
                    process::kill(pid);
                }
            }
        }

        if let Some(mut session) = sealteam_state::read_session_state(&self.opts.workspace).await? {
            for entry in &mut session.agents {
                if process::pid_is_alive(entry.pid) {
                    process::kill(entry.pid);
                }
                if entry.status == AgentStatus::Running {
                    entry.status = AgentStatus::Cancelled;
                    entry.end_time = Some(chrono::Utc::now());
                }
            }
            session.status = SessionStatus::Failed;
            sealteam_state::write_session_state(&self.opts.workspace, &session).await?;
        }
        Ok(())
    }
}

/// Derive the `RESUME_FROM` value for a subprocess from its own last
/// completed step: a last step of Reflect resumes at the *next* iteration
/// with complexity re-derived from that iteration's Plan; any other last
/// step re-runs the current iteration from Plan.
async fn resume_from_arg(agent_dir: &Path) -> anyhow::Result<Option<String>> {
    let Some((iteration, step)) = sealteam_state::last_completed_step(agent_dir).await? else {
        return Ok(None);
    };
    Ok(Some(format!("{iteration}-{}", step.as_file_fragment())))
}

/// `<workspace>/logs`, `<workspace>/<leader_name>` initialized as its own
/// git repository with a `.gitignore` excluding `state/` and `logs/`.
async fn ensure_workspace(workspace: &Path, leader_name: &str) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(workspace.join("logs")).await?;
    let leader_dir = workspace.join(leader_name);
    tokio::fs::create_dir_all(&leader_dir).await?;

    if !leader_dir.join(".git").exists() {
        run_git(&["init"], &leader_dir).await?;
        tokio::fs::write(leader_dir.join(".gitignore"), "state/\nlogs/\n").await?;
        run_git(&["add", ".gitignore"], &leader_dir).await?;
        run_git(&["commit", "-m", "initial commit", "--allow-empty"], &leader_dir).await?;
    }
    Ok(())
}

async fn run_git(args: &[&str], workdir: &Path) -> anyhow::Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("running git {args:?} in {}", workdir.display()))?;
    if !status.success() {
        anyhow::bail!("git {args:?} exited with {status}");
    }
    Ok(())
}
