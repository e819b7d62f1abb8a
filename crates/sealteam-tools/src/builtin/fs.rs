// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read a UTF-8 text file and return its contents."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "'path' parameter is required");
        };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => ToolOutput::ok_categorized(&call.id, contents, OutputCategory::FileContent),
            Err(e) => ToolOutput::err(&call.id, format!("reading {path}: {e}")),
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write (overwriting) a UTF-8 text file, creating parent directories if needed."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(path), Some(content)) = (
            call.args.get("path").and_then(|v| v.as_str()),
            call.args.get("content").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "'path' and 'content' parameters are required");
        };
        if let Some(parent) = std::path::Path::new(path).parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("creating parent dirs for {path}: {e}"));
            }
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("wrote {} bytes to {path}", content.len())),
            Err(e) => ToolOutput::err(&call.id, format!("writing {path}: {e}")),
        }
    }
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }
    fn description(&self) -> &str {
        "Replace the first occurrence of 'find' with 'replace' in a text file. \
         Errors if 'find' does not appear exactly once, to avoid ambiguous edits."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "find": { "type": "string" },
                "replace": { "type": "string" }
            },
            "required": ["path", "find", "replace"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(path), Some(find), Some(replace)) = (
            call.args.get("path").and_then(|v| v.as_str()),
            call.args.get("find").and_then(|v| v.as_str()),
            call.args.get("replace").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "'path', 'find' and 'replace' parameters are required");
        };
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("reading {path}: {e}")),
        };
        let matches = contents.matches(find).count();
        if matches == 0 {
            return ToolOutput::err(&call.id, format!("'find' text not found in {path}"));
        }
        if matches > 1 {
            return ToolOutput::err(&call.id, format!("'find' text appears {matches} times in {path}; must be unique"));
        }
        let updated = contents.replacen(find, replace, 1);
        match tokio::fs::write(path, updated).await {
            Ok(()) => ToolOutput::ok(&call.id, format!("edited {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("writing {path}: {e}")),
        }
    }
}

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }
    fn description(&self) -> &str {
        "List the immediate contents of a directory, one entry per line."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "'path' parameter is required");
        };
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(e) => e,
            Err(e) => return ToolOutput::err(&call.id, format!("listing {path}: {e}")),
        };
        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(e)) => names.push(e.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => return ToolOutput::err(&call.id, format!("listing {path}: {e}")),
            }
        }
        names.sort();
        ToolOutput::ok_categorized(&call.id, names.join("\n"), OutputCategory::MatchList)
    }
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }
    fn description(&self) -> &str {
        "Find files under 'root' whose path contains 'pattern' as a substring. \
         A lightweight stand-in for shell glob expansion that doesn't require a subprocess."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": { "type": "string" },
                "pattern": { "type": "string" }
            },
            "required": ["root", "pattern"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(root), Some(pattern)) = (
            call.args.get("root").and_then(|v| v.as_str()),
            call.args.get("pattern").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "'root' and 'pattern' parameters are required");
        };
        let root = root.to_string();
        let pattern = pattern.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().to_string_lossy().contains(&pattern))
                .map(|e| e.path().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_default();
        ToolOutput::ok_categorized(&call.id, matches.join("\n"), OutputCategory::MatchList)
    }
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Search files under 'root' for lines matching a regular expression; \
         returns '<path>:<line_no>:<line>' per match."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": { "type": "string" },
                "regex": { "type": "string" }
            },
            "required": ["root", "regex"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (Some(root), Some(pattern)) = (
            call.args.get("root").and_then(|v| v.as_str()),
            call.args.get("regex").and_then(|v| v.as_str()),
        ) else {
            return ToolOutput::err(&call.id, "'root' and 'regex' parameters are required");
        };
        let re = match regex::Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid regex: {e}")),
        };
        let root = root.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in walkdir::WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(entry.path()) else { continue };
                for (i, line) in text.lines().enumerate() {
                    if re.is_match(line) {
                        out.push(format!("{}:{}:{}", entry.path().display(), i + 1, line));
                    }
                }
            }
            out
        })
        .await
        .unwrap_or_default();
        ToolOutput::ok_categorized(&call.id, matches.join("\n"), OutputCategory::MatchList)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall { id: "1".into(), name: name.into(), args }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let write = WriteFileTool;
        let out = write
            .execute(&call("write_file", json!({"path": path.to_str(), "content": "hello"})))
            .await;
        assert!(!out.is_error);
        let read = ReadFileTool;
        let out = read.execute(&call("read_file", json!({"path": path.to_str()}))).await;
        assert_eq!(out.content, "hello");
    }

    #[tokio::test]
    async fn edit_file_replaces_unique_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();
        let edit = EditFileTool;
        let out = edit
            .execute(&call("edit_file", json!({"path": path.to_str(), "find": "world", "replace": "rust"})))
            .await;
        assert!(!out.is_error);
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "hello rust");
    }

    #[tokio::test]
    async fn edit_file_rejects_ambiguous_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, "a a a").await.unwrap();
        let edit = EditFileTool;
        let out = edit
            .execute(&call("edit_file", json!({"path": path.to_str(), "find": "a", "replace": "b"})))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn list_dir_sorts_entries() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "").await.unwrap();
        let list = ListDirTool;
        let out = list.execute(&call("list_dir", json!({"path": dir.path().to_str()}))).await;
        assert_eq!(out.content, "a.txt\nb.txt");
    }

    #[tokio::test]
    async fn grep_finds_matching_lines() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "foo\nbar\nfoobar\n").await.unwrap();
        let grep = GrepTool;
        let out = grep
            .execute(&call("grep", json!({"root": dir.path().to_str(), "regex": "^foo"})))
            .await;
        assert!(out.content.contains("a.txt:1:foo"));
        assert!(!out.content.contains(":2:bar"));
    }
}
