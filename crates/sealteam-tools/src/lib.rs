// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod policy;
pub mod registry;
pub mod tool;
pub mod validator;

pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, OutputCategoryTag, Tool, ToolCall, ToolOutput};
pub use validator::{scan_dynamic, validate_tool, DynamicTool, ToolRegistryEntry, ToolRegistryStatus, ValidationError};

use std::path::PathBuf;
use std::sync::Arc;

use sealteam_queue::QueueBackend;

/// Build the registry every agent process starts with: every built-in tool
/// the role is allowed, filtered later by `allowed_tools` at schema-listing
/// time, plus the `web_search` server-hosted descriptor.
pub fn build_registry(
    backend: Arc<dyn QueueBackend>,
    workspace: PathBuf,
    queue_url: String,
    agent_name: String,
    binary_path: PathBuf,
    leader_model: String,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(builtin::ShellTool::default());
    registry.register(builtin::ReadFileTool);
    registry.register(builtin::WriteFileTool);
    registry.register(builtin::EditFileTool);
    registry.register(builtin::ListDirTool);
    registry.register(builtin::GlobTool);
    registry.register(builtin::GrepTool);
    registry.register(builtin::GitTool);
    registry.register(builtin::WebFetchTool::default());
    registry.register(builtin::CreateToolTool { workspace: workspace.clone() });
    registry.register(builtin::SendTool { backend, workspace: workspace.clone(), from: agent_name });
    registry.register(builtin::SpawnTool::new(binary_path, workspace, queue_url, leader_model));
    registry.register_server_hosted(builtin::web_search::definition());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealteam_config::AgentRole;
    use sealteam_queue::MockQueueBackend;
    use tempfile::tempdir;

    #[test]
    fn build_registry_includes_every_builtin() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn QueueBackend> = Arc::new(MockQueueBackend::new());
        let registry = build_registry(
            backend,
            dir.path().into(),
            "redis://127.0.0.1:6379".into(),
            "bob".into(),
            PathBuf::from("/usr/local/bin/sealteam"),
            "claude-sonnet-4-5".into(),
        );
        for name in ["shell", "read_file", "write_file", "edit_file", "list_dir", "glob", "grep", "git", "web_fetch", "create-tool", "send", "spawn"] {
            assert!(registry.get(name).is_some(), "missing tool: {name}");
        }
        assert!(registry.is_server_tool("web_search"));
    }

    #[test]
    fn spawn_and_git_are_leader_only() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn QueueBackend> = Arc::new(MockQueueBackend::new());
        let registry = build_registry(
            backend,
            dir.path().into(),
            "redis://127.0.0.1:6379".into(),
            "bob".into(),
            PathBuf::from("/usr/local/bin/sealteam"),
            "claude-sonnet-4-5".into(),
        );
        let spawn = registry.get("spawn").unwrap();
        assert_eq!(spawn.roles(), &[AgentRole::Leader]);
    }
}
