// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use sealteam_config::{AgentConfig, AgentRole};
use sealteam_state::{AgentSessionEntry, AgentStatus, SessionState, SessionStatus};
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Name of the leader's own working directory within the session
/// workspace; matches `sealteam_supervisor::process::LEADER_NAME`.
const LEADER_NAME: &str = "bob";

/// Clone the leader's repo into the new worker's own directory and check
/// out `agent/<name>`, giving each worker an isolated working tree on its
/// own branch that the leader later merges back.
async fn clone_worker_tree(leader_dir: &std::path::Path, worker_dir: &std::path::Path, name: &str) -> Result<(), String> {
    if worker_dir.join(".git").exists() {
        return Ok(());
    }
    if let Some(parent) = worker_dir.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| format!("creating {}: {e}", parent.display()))?;
    }
    let leader = leader_dir.to_string_lossy().into_owned();
    let worker = worker_dir.to_string_lossy().into_owned();
    match crate::builtin::git::run_git(&["clone", &leader, &worker], None).await? {
        (0, _) => {}
        (code, out) => return Err(format!("git clone exited {code}: {out}")),
    }
    match crate::builtin::git::run_git(&["checkout", "-b", &format!("agent/{name}")], worker_dir.to_str()).await? {
        (0, _) => Ok(()),
        (code, out) => Err(format!("git checkout -b exited {code}: {out}")),
    }
}

/// Leader-only tool: spawns a worker subprocess running the `sealteam`
/// binary with a serialized `AgentConfig` in its `AGENT_CONFIG` environment
/// variable, and appends the new `AgentSessionEntry` to the session state
/// file. Serialized behind a mutex since a spawn reads, mutates, and
/// rewrites the whole session file.
pub struct SpawnTool {
    pub binary_path: PathBuf,
    pub workspace: PathBuf,
    pub queue_url: String,
    pub leader_model: String,
    pub lock: Mutex<()>,
}

impl SpawnTool {
    pub fn new(binary_path: PathBuf, workspace: PathBuf, queue_url: String, leader_model: String) -> Self {
        Self { binary_path, workspace, queue_url, leader_model, lock: Mutex::new(()) }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }
    fn description(&self) -> &str {
        "Spawn a new worker agent subprocess with the given name, purpose, and allowed \
         tool list. Only the leader may call this tool."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "purpose": { "type": "string" },
                "allowed_tools": { "type": "array", "items": { "type": "string" } },
                "model": { "type": "string" },
                "token_budget": { "type": "integer" },
                "max_iterations": { "type": "integer" },
                "max_tool_turns": { "type": "integer" }
            },
            "required": ["name", "purpose", "allowed_tools"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    fn roles(&self) -> &'static [sealteam_config::AgentRole] {
        &[sealteam_config::AgentRole::Leader]
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(name), Some(purpose), Some(allowed_tools)) = (
            call.args.get("name").and_then(|v| v.as_str()),
            call.args.get("purpose").and_then(|v| v.as_str()),
            call.args.get("allowed_tools").and_then(|v| v.as_array()),
        ) else {
            return ToolOutput::err(&call.id, "'name', 'purpose' and 'allowed_tools' parameters are required");
        };
        let allowed_tools: Vec<String> = allowed_tools.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        let model = call.args.get("model").and_then(|v| v.as_str()).unwrap_or(&self.leader_model).to_string();
        let token_budget = call.args.get("token_budget").and_then(|v| v.as_u64()).unwrap_or(500_000);
        let max_iterations = call.args.get("max_iterations").and_then(|v| v.as_u64()).unwrap_or(50) as u32;
        let max_tool_turns = call.args.get("max_tool_turns").and_then(|v| v.as_u64()).unwrap_or(20) as u32;

        let config = AgentConfig {
            name: name.to_string(),
            role: AgentRole::Worker,
            purpose: purpose.to_string(),
            allowed_tools,
            model,
            token_budget,
            max_iterations,
            max_tool_turns,
            workspace: self.workspace.clone(),
            queue_url: self.queue_url.clone(),
        };

        let _guard = self.lock.lock().await;

        let mut existing = match sealteam_state::read_session_state(&self.workspace).await {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, format!("reading session state: {e}")),
        };
        if let Some(session) = &existing {
            if session.agents.iter().any(|a| a.config.name == name) {
                return ToolOutput::err(&call.id, format!("agent '{name}' already exists in this session"));
            }
        }

        let leader_dir = self.workspace.join(LEADER_NAME);
        let worker_dir = self.workspace.join(name);
        if let Err(e) = clone_worker_tree(&leader_dir, &worker_dir, name).await {
            return ToolOutput::err(&call.id, format!("cloning worker tree for '{name}': {e}"));
        }

        let payload = match serde_json::to_string(&config) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, format!("serializing agent config: {e}")),
        };

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("agent").env("AGENT_CONFIG", &payload);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(false);
        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("spawning worker '{name}': {e}")),
        };
        let Some(pid) = child.id() else {
            return ToolOutput::err(&call.id, format!("worker '{name}' exited before pid was available"));
        };
        // Detach: the life loop's own monitor thread tracks liveness via the
        // session file, not via holding the `Child` handle open here.
        std::mem::drop(child);

        let entry = AgentSessionEntry {
            config,
            pid,
            status: AgentStatus::Running,
            start_time: chrono::Utc::now(),
            end_time: None,
        };

        let session = existing.get_or_insert_with(|| SessionState {
            goal: String::new(),
            start_time: chrono::Utc::now(),
            workspace: self.workspace.clone(),
            queue_url: self.queue_url.clone(),
            status: SessionStatus::Running,
            agents: Vec::new(),
        });
        session.agents.push(entry);
        session.status = session.derive_status();

        if let Err(e) = sealteam_state::write_session_state(&self.workspace, session).await {
            return ToolOutput::err(&call.id, format!("writing session state: {e}"));
        }

        ToolOutput::ok(&call.id, format!("spawned '{name}' (pid {pid})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    /// Fresh `git init`-ed leader directory with one commit, the same
    /// shape `sealteam_supervisor::ensure_workspace` produces, so a worker
    /// has something to clone from.
    async fn init_leader_repo(workspace: &std::path::Path) {
        let leader_dir = workspace.join(LEADER_NAME);
        tokio::fs::create_dir_all(&leader_dir).await.unwrap();
        let dir_str = leader_dir.to_str().unwrap();
        crate::builtin::git::run_git(&["init"], Some(dir_str)).await.unwrap();
        crate::builtin::git::run_git(&["commit", "-m", "initial commit", "--allow-empty"], Some(dir_str)).await.unwrap();
    }

    #[tokio::test]
    async fn spawn_appends_session_entry() {
        let dir = tempdir().unwrap();
        init_leader_repo(dir.path()).await;
        let tool = SpawnTool::new(
            PathBuf::from("/bin/true"),
            dir.path().into(),
            "redis://127.0.0.1:6379".into(),
            "claude-sonnet-4-5".into(),
        );
        let call = ToolCall {
            id: "1".into(),
            name: "spawn".into(),
            args: json!({"name": "worker-1", "purpose": "do the thing", "allowed_tools": ["shell"]}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);

        let session = sealteam_state::read_session_state(dir.path()).await.unwrap().unwrap();
        assert_eq!(session.agents.len(), 1);
        assert_eq!(session.agents[0].config.name, "worker-1");
        assert_eq!(session.agents[0].status, AgentStatus::Running);
    }

    #[tokio::test]
    async fn spawn_clones_leader_repo_onto_agent_branch() {
        let dir = tempdir().unwrap();
        init_leader_repo(dir.path()).await;
        let tool = SpawnTool::new(
            PathBuf::from("/bin/true"),
            dir.path().into(),
            "redis://127.0.0.1:6379".into(),
            "claude-sonnet-4-5".into(),
        );
        let call = ToolCall {
            id: "1".into(),
            name: "spawn".into(),
            args: json!({"name": "worker-1", "purpose": "do the thing", "allowed_tools": []}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);

        let worker_dir = dir.path().join("worker-1");
        assert!(worker_dir.join(".git").is_dir());
        let (code, branch) = crate::builtin::git::run_git(&["branch", "--show-current"], Some(worker_dir.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(branch.trim(), "agent/worker-1");
    }

    #[tokio::test]
    async fn spawn_rejects_duplicate_name() {
        let dir = tempdir().unwrap();
        init_leader_repo(dir.path()).await;
        let tool = SpawnTool::new(
            PathBuf::from("/bin/true"),
            dir.path().into(),
            "redis://127.0.0.1:6379".into(),
            "claude-sonnet-4-5".into(),
        );
        let call = ToolCall {
            id: "1".into(),
            name: "spawn".into(),
            args: json!({"name": "worker-1", "purpose": "x", "allowed_tools": []}),
        };
        tool.execute(&call).await;
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn missing_required_fields_is_error() {
        let dir = tempdir().unwrap();
        let tool = SpawnTool::new(
            PathBuf::from("/bin/true"),
            dir.path().into(),
            "redis://127.0.0.1:6379".into(),
            "claude-sonnet-4-5".into(),
        );
        let call = ToolCall { id: "1".into(), name: "spawn".into(), args: json!({}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
