// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};
use crate::validator::{validate_tool, ToolRegistryStatus};

/// Writes a new dynamic tool's source and its companion test file under
/// `tools/`, then hands it straight to the validator pipeline. The tool
/// only becomes callable once validation flips its registry entry to
/// `Active`.
pub struct CreateToolTool {
    pub workspace: PathBuf,
}

#[async_trait]
impl Tool for CreateToolTool {
    fn name(&self) -> &str {
        "create-tool"
    }
    fn description(&self) -> &str {
        "Author a new dynamic tool: write its TypeScript source to tools/<name>.ts and \
         its test companion to tools/<name>.test.ts, then validate it. The tool is usable \
         once validation succeeds; otherwise it is registered as disabled with the reason."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "source": { "type": "string" },
                "test_source": { "type": "string" }
            },
            "required": ["name", "source", "test_source"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(name), Some(source), Some(test_source)) = (
            call.args.get("name").and_then(|v| v.as_str()),
            call.args.get("source").and_then(|v| v.as_str()),
            call.args.get("test_source").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "'name', 'source' and 'test_source' parameters are required");
        };

        let tools_dir = self.workspace.join("tools");
        if let Err(e) = tokio::fs::create_dir_all(&tools_dir).await {
            return ToolOutput::err(&call.id, format!("creating tools/ dir: {e}"));
        }
        let rel_path = format!("{name}.ts");
        let src_path = tools_dir.join(&rel_path);
        let test_path = tools_dir.join(format!("{name}.test.ts"));
        if let Err(e) = tokio::fs::write(&src_path, source).await {
            return ToolOutput::err(&call.id, format!("writing {}: {e}", src_path.display()));
        }
        if let Err(e) = tokio::fs::write(&test_path, test_source).await {
            return ToolOutput::err(&call.id, format!("writing {}: {e}", test_path.display()));
        }

        match validate_tool(&self.workspace, name, &PathBuf::from(&rel_path)).await {
            Ok(entry) if entry.status == ToolRegistryStatus::Active => {
                ToolOutput::ok(&call.id, format!("tool '{name}' created and active"))
            }
            Ok(entry) => ToolOutput::err(
                &call.id,
                format!("tool '{name}' disabled: {}", entry.error.unwrap_or_default()),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("validating tool '{name}': {e}")),
        }
    }
}
