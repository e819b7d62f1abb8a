// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::{InferResponse, Message, ToolSchema};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("non-retryable: {0}")]
    NonRetryable(String),
}

/// The narrow boundary to an LLM backend. Every life-loop step call goes
/// through this trait; nothing above it knows which provider is behind it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn infer(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<InferResponse, LlmError>;
}

/// Exponential backoff wrapper: base 1s, up to 3 attempts (1s, 2s, 4s) —
/// distinct from the message bus's own base-500ms retry discipline. Only
/// [`LlmError::Transient`] failures are retried; [`LlmError::NonRetryable`]
/// (bad request, auth failure, content policy) fails immediately.
pub async fn infer_with_retry(
    client: &dyn LlmClient,
    system_prompt: &str,
    messages: &[Message],
    tools: &[ToolSchema],
) -> Result<InferResponse, LlmError> {
    const BASE_DELAY_MS: u64 = 1_000;
    const MAX_ATTEMPTS: u32 = 3;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.infer(system_prompt, messages, tools).await {
            Ok(resp) => return Ok(resp),
            Err(LlmError::NonRetryable(e)) => return Err(LlmError::NonRetryable(e)),
            Err(LlmError::Transient(e)) if attempt >= MAX_ATTEMPTS => {
                return Err(LlmError::Transient(e))
            }
            Err(LlmError::Transient(e)) => {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                warn!(attempt, delay_ms = delay, error = %e, "transient LLM error, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        fn model_name(&self) -> &str {
            "flaky"
        }

        async fn infer(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[ToolSchema],
        ) -> Result<InferResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(LlmError::Transient("connection reset".into()))
            } else {
                Ok(InferResponse { content: vec![], usage: Default::default() })
            }
        }
    }

    struct AlwaysNonRetryable;

    #[async_trait]
    impl LlmClient for AlwaysNonRetryable {
        fn model_name(&self) -> &str {
            "broken"
        }

        async fn infer(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[ToolSchema],
        ) -> Result<InferResponse, LlmError> {
            Err(LlmError::NonRetryable("invalid api key".into()))
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let client = FlakyClient { fail_times: 2, calls: AtomicU32::new(0) };
        let result = infer_with_retry(&client, "sys", &[], &[]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let client = FlakyClient { fail_times: 10, calls: AtomicU32::new(0) };
        let result = infer_with_retry(&client, "sys", &[], &[]).await;
        assert!(matches!(result, Err(LlmError::Transient(_))));
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let client = AlwaysNonRetryable;
        let result = infer_with_retry(&client, "sys", &[], &[]).await;
        assert!(matches!(result, Err(LlmError::NonRetryable(_))));
    }
}
