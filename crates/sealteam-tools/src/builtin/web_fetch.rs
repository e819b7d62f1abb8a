// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const MAX_BODY_BYTES: usize = 200_000;

/// Fetches a URL and renders its HTML body down to plain text, the way a
/// model wants to read a page rather than its markup.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }
    fn description(&self) -> &str {
        "Fetch a URL over HTTP(S) and return its content as plain text, truncated to ~200KB."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"],
            "additionalProperties": false
        })
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(url) = call.args.get("url").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "'url' parameter is required");
        };
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("fetching {url}: {e}")),
        };
        if !resp.status().is_success() {
            return ToolOutput::err(&call.id, format!("fetching {url}: HTTP {}", resp.status()));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("reading body of {url}: {e}")),
        };
        let text = if content_type.contains("html") {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        let truncated = if text.len() > MAX_BODY_BYTES {
            format!("{}\n...[truncated]...", &text[..MAX_BODY_BYTES])
        } else {
            text
        };
        ToolOutput::ok_categorized(&call.id, truncated, OutputCategory::Generic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_url_is_error() {
        let tool = WebFetchTool::default();
        let call = ToolCall { id: "1".into(), name: "web_fetch".into(), args: json!({}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn unreachable_host_is_error() {
        let tool = WebFetchTool::default();
        let call = ToolCall {
            id: "1".into(),
            name: "web_fetch".into(),
            args: json!({"url": "http://127.0.0.1.invalid.example/"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }
}
