// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;

use crate::builtin::shell::head_tail_truncate;
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Leader-only tool wrapping the `git` subcommands a team lead needs to
/// land worker branches: status, diff, add/commit, checkout/branch, merge.
pub struct GitTool;

pub(crate) async fn run_git(args: &[&str], workdir: Option<&str>) -> Result<(i32, String), String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    if let Some(wd) = workdir {
        cmd.current_dir(wd);
    }
    let output = cmd.output().await.map_err(|e| format!("spawn error: {e}"))?;
    let mut text = String::new();
    text.push_str(&String::from_utf8_lossy(&output.stdout));
    if !output.stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    Ok((output.status.code().unwrap_or(-1), text))
}

#[async_trait]
impl Tool for GitTool {
    fn name(&self) -> &str {
        "git"
    }
    fn description(&self) -> &str {
        "Run a git subcommand (status, diff, add, commit, checkout, branch, merge, log) \
         in the workspace. 'args' is the list of arguments after 'git'."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "args": { "type": "array", "items": { "type": "string" } },
                "workdir": { "type": "string" }
            },
            "required": ["args"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    fn roles(&self) -> &'static [sealteam_config::AgentRole] {
        &[sealteam_config::AgentRole::Leader]
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(args) = call.args.get("args").and_then(|v| v.as_array()) else {
            return ToolOutput::err(&call.id, "'args' parameter is required");
        };
        let args: Vec<&str> = args.iter().filter_map(|v| v.as_str()).collect();
        if args.is_empty() {
            return ToolOutput::err(&call.id, "'args' must not be empty");
        }
        let workdir = call.args.get("workdir").and_then(|v| v.as_str());
        match run_git(&args, workdir).await {
            Ok((0, out)) => ToolOutput::ok_categorized(&call.id, head_tail_truncate(&out), OutputCategory::HeadTail),
            Ok((code, out)) => ToolOutput::err(&call.id, format!("[exit {code}]\n{}", head_tail_truncate(&out))),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn git_status_on_fresh_repo() {
        let dir = tempdir().unwrap();
        run_git(&["init"], dir.path().to_str()).await.unwrap();
        let tool = GitTool;
        let call = ToolCall {
            id: "1".into(),
            name: "git".into(),
            args: json!({"args": ["status"], "workdir": dir.path().to_str()}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);
    }

    #[tokio::test]
    async fn empty_args_is_error() {
        let tool = GitTool;
        let call = ToolCall { id: "1".into(), name: "git".into(), args: json!({"args": []}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn invalid_subcommand_is_error() {
        let dir = tempdir().unwrap();
        run_git(&["init"], dir.path().to_str()).await.unwrap();
        let tool = GitTool;
        let call = ToolCall {
            id: "1".into(),
            name: "git".into(),
            args: json!({"args": ["not-a-real-subcommand"], "workdir": dir.path().to_str()}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
