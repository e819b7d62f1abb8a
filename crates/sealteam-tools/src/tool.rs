// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::ApprovalPolicy;

/// One tool invocation requested by the model during a tool sub-loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// How a tool's output should be truncated when it doesn't fit the
/// compactor's budget. Tagging output by category lets the compactor trim
/// each kind the way it deserves instead of blindly cutting the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    /// Long narrative or log-like output: keep head and tail, drop the middle.
    HeadTail,
    /// A list of matches (grep/glob/find): keep the first N lines.
    MatchList,
    /// The full contents of one file: keep head and tail around the region
    /// of interest.
    FileContent,
    /// Anything else: keep the head, truncate the rest.
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    #[serde(skip)]
    pub category: Option<OutputCategoryTag>,
}

/// Serializable stand-in for [`OutputCategory`] so `ToolOutput` can still
/// derive `Serialize`/`Deserialize` for persistence in iteration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCategoryTag(pub OutputCategory);

impl ToolOutput {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: tool_call_id.into(), content: content.into(), is_error: false, category: None }
    }

    pub fn ok_categorized(tool_call_id: impl Into<String>, content: impl Into<String>, category: OutputCategory) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
            category: Some(OutputCategoryTag(category)),
        }
    }

    pub fn err(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: tool_call_id.into(), content: content.into(), is_error: true, category: None }
    }
}

/// Uniform interface every local tool implements. Tool handlers never fail
/// the caller with a `Result`: errors are caught and reported as an error
/// `ToolOutput` so one bad tool invocation never poisons the life loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    /// Roles allowed to use this tool (e.g. `spawn` is leader-only).
    fn roles(&self) -> &'static [sealteam_config::AgentRole] {
        &[sealteam_config::AgentRole::Leader, sealteam_config::AgentRole::Worker]
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_output_is_not_error() {
        let out = ToolOutput::ok("1", "done");
        assert!(!out.is_error);
        assert_eq!(out.content, "done");
    }

    #[test]
    fn err_output_is_error() {
        let out = ToolOutput::err("1", "boom");
        assert!(out.is_error);
    }
}
