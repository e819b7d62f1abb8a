// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{InferResponse, LlmClient, LlmError, Message, ToolSchema, Usage};

/// A deterministic test double that returns canned responses in order.
/// Driving the life loop and supervisor through their test scenarios never
/// needs a live model; this is the only `LlmClient` the test suite uses.
pub struct MockLlmClient {
    responses: Mutex<Vec<Result<InferResponse, LlmError>>>,
}

impl MockLlmClient {
    /// Responses are consumed front-to-back, one per `infer` call.
    pub fn new(responses: Vec<Result<InferResponse, LlmError>>) -> Self {
        Self { responses: Mutex::new(responses) }
    }

    pub fn text_only(replies: Vec<&str>) -> Self {
        Self::new(
            replies
                .into_iter()
                .map(|r| {
                    Ok(InferResponse {
                        content: vec![crate::ResponseContent::Text(r.to_string())],
                        usage: Usage { input_tokens: 100, output_tokens: 50 },
                    })
                })
                .collect(),
        )
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn infer(
        &self,
        _system_prompt: &str,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<InferResponse, LlmError> {
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(LlmError::NonRetryable("mock client exhausted".into()));
        }
        responses.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_responses_in_order() {
        let client = MockLlmClient::text_only(vec!["first", "second"]);
        let r1 = client.infer("sys", &[], &[]).await.unwrap();
        assert_eq!(r1.text(), "first");
        let r2 = client.infer("sys", &[], &[]).await.unwrap();
        assert_eq!(r2.text(), "second");
    }

    #[tokio::test]
    async fn exhausted_client_returns_non_retryable_error() {
        let client = MockLlmClient::text_only(vec!["only"]);
        client.infer("sys", &[], &[]).await.unwrap();
        let err = client.infer("sys", &[], &[]).await;
        assert!(matches!(err, Err(LlmError::NonRetryable(_))));
    }
}
