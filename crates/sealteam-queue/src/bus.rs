// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use crate::{backend::QueueBackend, message::QueueMessage};

const SHARED_ADDRESS: &str = "shared";
const BASE_DELAY_MS: u64 = 500;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("shared send requires a workspace")]
    MissingWorkspace,
    #[error("backend error after {attempts} attempts: {source}")]
    Backend {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

fn queue_key(agent: &str) -> String {
    format!("queue:{agent}")
}

/// Retry a backend operation with exponential backoff: base 500ms, up to 3
/// attempts, matching the message bus's durability contract.
async fn with_retry<F, Fut, T>(mut op: F) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= MAX_ATTEMPTS => {
                return Err(QueueError::Backend { attempts: attempt, source: e })
            }
            Err(e) => {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                warn!(attempt, delay_ms = delay, error = %e, "queue op failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
    }
}

/// Send `msg` to its `to` address. A `to == "shared"` message is expanded
/// into one copy per currently-`Running` agent (excluding `from`), read from
/// the session state file in `workspace`; `workspace` must be supplied for a
/// shared send.
pub async fn send(
    backend: &dyn QueueBackend,
    msg: QueueMessage,
    workspace: Option<&Path>,
) -> Result<(), QueueError> {
    if msg.to == SHARED_ADDRESS {
        let workspace = workspace.ok_or(QueueError::MissingWorkspace)?;
        let session = sealteam_state::read_session_state(workspace)
            .await
            .map_err(|e| QueueError::Backend { attempts: 1, source: anyhow::anyhow!(e) })?;
        let Some(session) = session else {
            return Ok(());
        };
        for name in session.running_agent_names(&msg.from) {
            let mut copy = msg.clone();
            copy.id = uuid::Uuid::new_v4();
            copy.to = name.clone();
            let payload = serde_json::to_string(&copy)
                .map_err(|e| QueueError::Backend { attempts: 1, source: e.into() })?;
            with_retry(|| async { backend.lpush(&queue_key(&name), payload.clone()).await }).await?;
        }
        Ok(())
    } else {
        let payload = serde_json::to_string(&msg)
            .map_err(|e| QueueError::Backend { attempts: 1, source: e.into() })?;
        with_retry(|| async { backend.lpush(&queue_key(&msg.to), payload.clone()).await }).await
    }
}

/// Block up to `timeout_secs` for the next message addressed to `name`.
pub async fn receive(
    backend: &dyn QueueBackend,
    name: &str,
    timeout_secs: u64,
) -> Result<Option<QueueMessage>, QueueError> {
    let key = queue_key(name);
    let raw = with_retry(|| async { backend.brpop(&key, timeout_secs).await }).await?;
    parse(raw)
}

/// Non-blocking variant of [`receive`].
pub async fn receive_non_blocking(
    backend: &dyn QueueBackend,
    name: &str,
) -> Result<Option<QueueMessage>, QueueError> {
    let key = queue_key(name);
    let raw = with_retry(|| async { backend.rpop(&key).await }).await?;
    parse(raw)
}

fn parse(raw: Option<String>) -> Result<Option<QueueMessage>, QueueError> {
    match raw {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| QueueError::Backend { attempts: 1, source: e.into() }),
    }
}

/// Delete every `queue:*` key. Supervisor-only, called once at session
/// startup since queue keys are not durable across sessions.
pub async fn flush_all(backend: &dyn QueueBackend) -> Result<usize, QueueError> {
    let keys = with_retry(|| async { backend.keys("queue:*").await }).await?;
    with_retry(|| async { backend.del(&keys).await }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageType, MockQueueBackend};
    use sealteam_config::{AgentConfig, AgentRole};
    use sealteam_state::{AgentSessionEntry, AgentStatus, SessionState, SessionStatus};
    use tempfile::tempdir;

    fn agent_entry(name: &str, status: AgentStatus) -> AgentSessionEntry {
        AgentSessionEntry {
            config: AgentConfig {
                name: name.to_string(),
                role: AgentRole::Worker,
                purpose: String::new(),
                allowed_tools: vec![],
                model: "claude-sonnet-4-5".into(),
                token_budget: 1000,
                max_iterations: 10,
                max_tool_turns: 5,
                workspace: "/tmp".into(),
                queue_url: "redis://127.0.0.1:6379".into(),
            },
            pid: 1,
            status,
            start_time: chrono::Utc::now(),
            end_time: None,
        }
    }

    #[tokio::test]
    async fn direct_send_then_receive_round_trips() {
        let backend = MockQueueBackend::new();
        let msg = QueueMessage::new("bob", "worker-1", MessageType::Task, "do the thing");
        send(&backend, msg.clone(), None).await.unwrap();
        let received = receive_non_blocking(&backend, "worker-1").await.unwrap();
        assert_eq!(received, Some(msg));
    }

    #[tokio::test]
    async fn receive_non_blocking_empty_queue_returns_none() {
        let backend = MockQueueBackend::new();
        assert_eq!(receive_non_blocking(&backend, "nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn shared_send_without_workspace_errors() {
        let backend = MockQueueBackend::new();
        let msg = QueueMessage::new("bob", "shared", MessageType::Status, "halfway");
        let result = send(&backend, msg, None).await;
        assert!(matches!(result, Err(QueueError::MissingWorkspace)));
    }

    #[tokio::test]
    async fn shared_send_fans_out_to_running_agents_excluding_sender() {
        let backend = MockQueueBackend::new();
        let dir = tempdir().unwrap();
        let session = SessionState {
            goal: "ship it".into(),
            start_time: chrono::Utc::now(),
            workspace: dir.path().into(),
            queue_url: "redis://127.0.0.1:6379".into(),
            status: SessionStatus::Running,
            agents: vec![
                agent_entry("bob", AgentStatus::Running),
                agent_entry("worker-1", AgentStatus::Running),
                agent_entry("worker-2", AgentStatus::Completed),
            ],
        };
        sealteam_state::write_session_state(dir.path(), &session).await.unwrap();

        let msg = QueueMessage::new("bob", "shared", MessageType::Status, "halfway");
        send(&backend, msg, Some(dir.path())).await.unwrap();

        assert!(receive_non_blocking(&backend, "bob").await.unwrap().is_none());
        assert!(receive_non_blocking(&backend, "worker-1").await.unwrap().is_some());
        assert!(receive_non_blocking(&backend, "worker-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_all_removes_every_queue_key() {
        let backend = MockQueueBackend::new();
        backend.lpush("queue:bob", "x".into()).await.unwrap();
        backend.lpush("queue:worker-1", "y".into()).await.unwrap();
        let removed = flush_all(&backend).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(receive_non_blocking(&backend, "bob").await.unwrap(), None);
    }
}
