// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{InferResponse, LlmClient, LlmError, Message, MessageContent, ResponseContent, Role, ToolSchema, Usage};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_output_tokens,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

fn to_anthropic_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
                Role::System => unreachable!("filtered above"),
            }
            .to_string();
            let content = match &m.content {
                MessageContent::Text(t) => json!(t),
                MessageContent::ToolCall { tool_call_id, function } => json!([{
                    "type": "tool_use",
                    "id": tool_call_id,
                    "name": function.name,
                    "input": serde_json::from_str::<serde_json::Value>(&function.arguments)
                        .unwrap_or(serde_json::Value::Null),
                }]),
                MessageContent::ToolResult { tool_call_id, content } => json!([{
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                }]),
            };
            AnthropicMessage { role, content }
        })
        .collect()
}

fn system_text(messages: &[Message], system_prompt: &str) -> String {
    let mut parts: Vec<&str> = vec![system_prompt];
    for m in messages {
        if m.role == Role::System {
            if let Some(t) = m.as_text() {
                parts.push(t);
            }
        }
    }
    parts.join("\n\n")
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn infer(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<InferResponse, LlmError> {
        let req = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_output_tokens,
            system: system_text(messages, system_prompt),
            messages: to_anthropic_messages(messages),
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        };

        let resp = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&req)
            .send()
            .await
            .map_err(|e| LlmError::Transient(format!("request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(LlmError::Transient(format!("server returned {status}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::NonRetryable(format!("{status}: {body}")));
        }

        let parsed: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("bad response body: {e}")))?;

        let content = parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicContentBlock::Text { text } => Some(ResponseContent::Text(text)),
                AnthropicContentBlock::ToolUse { id, name, input } => Some(ResponseContent::ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                AnthropicContentBlock::Other => None,
            })
            .collect();

        Ok(InferResponse {
            content,
            usage: Usage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_anthropic_messages_drops_system_role() {
        let messages = vec![Message::system("be nice"), Message::user("hi")];
        let out = to_anthropic_messages(&messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, "user");
    }

    #[test]
    fn tool_result_role_maps_to_user() {
        let messages = vec![Message::tool_result("id1", "output text")];
        let out = to_anthropic_messages(&messages);
        assert_eq!(out[0].role, "user");
    }

    #[test]
    fn system_text_concatenates_system_messages() {
        let messages = vec![Message::system("extra context"), Message::user("hi")];
        let text = system_text(&messages, "base prompt");
        assert!(text.contains("base prompt"));
        assert!(text.contains("extra context"));
    }
}
