// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sealteam_queue::{MessageType, QueueBackend, QueueMessage};
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Thin wrapper over [`sealteam_queue::bus::send`]: lets an agent message
/// another agent (or `"shared"` to fan out to every running peer) without
/// reaching into the queue crate directly.
pub struct SendTool {
    pub backend: Arc<dyn QueueBackend>,
    pub workspace: PathBuf,
    pub from: String,
}

fn parse_message_type(s: &str) -> Option<MessageType> {
    match s {
        "task" => Some(MessageType::Task),
        "status" => Some(MessageType::Status),
        "review" => Some(MessageType::Review),
        "complete" => Some(MessageType::Complete),
        "error" => Some(MessageType::Error),
        "cancel" => Some(MessageType::Cancel),
        "all-complete" => Some(MessageType::AllComplete),
        _ => None,
    }
}

#[async_trait]
impl Tool for SendTool {
    fn name(&self) -> &str {
        "send"
    }
    fn description(&self) -> &str {
        "Send a message to another agent by name, or to 'shared' to fan out to every \
         currently running agent except yourself."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string" },
                "message_type": {
                    "type": "string",
                    "enum": ["task", "status", "review", "complete", "error", "cancel", "all-complete"]
                },
                "content": { "type": "string" }
            },
            "required": ["to", "message_type", "content"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(to), Some(mt), Some(content)) = (
            call.args.get("to").and_then(|v| v.as_str()),
            call.args.get("message_type").and_then(|v| v.as_str()),
            call.args.get("content").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "'to', 'message_type' and 'content' parameters are required");
        };
        let Some(message_type) = parse_message_type(mt) else {
            return ToolOutput::err(&call.id, format!("unknown message_type: {mt}"));
        };
        let msg = QueueMessage::new(&self.from, to, message_type, content);
        match sealteam_queue::send(self.backend.as_ref(), msg, Some(&self.workspace)).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("sent to {to}")),
            Err(e) => ToolOutput::err(&call.id, format!("send failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealteam_queue::MockQueueBackend;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn direct_send_succeeds() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn QueueBackend> = Arc::new(MockQueueBackend::new());
        let tool = SendTool { backend: backend.clone(), workspace: dir.path().into(), from: "bob".into() };
        let call = ToolCall {
            id: "1".into(),
            name: "send".into(),
            args: json!({"to": "worker-1", "message_type": "task", "content": "go"}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);
    }

    #[tokio::test]
    async fn unknown_message_type_is_error() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn QueueBackend> = Arc::new(MockQueueBackend::new());
        let tool = SendTool { backend, workspace: dir.path().into(), from: "bob".into() };
        let call = ToolCall {
            id: "1".into(),
            name: "send".into(),
            args: json!({"to": "worker-1", "message_type": "bogus", "content": "go"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
