// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backend::QueueBackend;

/// In-memory [`QueueBackend`] used by the life-loop and supervisor test
/// suites. `brpop` with a nonzero timeout polls rather than truly blocking —
/// fine for tests, which always push before popping.
#[derive(Default)]
pub struct MockQueueBackend {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MockQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for MockQueueBackend {
    async fn lpush(&self, key: &str, value: String) -> anyhow::Result<()> {
        let mut queues = self.queues.lock().await;
        queues.entry(key.to_string()).or_default().push_front(value);
        Ok(())
    }

    async fn brpop(&self, key: &str, timeout_secs: u64) -> anyhow::Result<Option<String>> {
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_secs(if timeout_secs == 0 { 5 } else { timeout_secs });
        loop {
            if let Some(v) = self.rpop(key).await? {
                return Ok(Some(v));
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    async fn rpop(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut queues = self.queues.lock().await;
        Ok(queues.get_mut(key).and_then(|q| q.pop_back()))
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let queues = self.queues.lock().await;
        Ok(queues
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn del(&self, keys: &[String]) -> anyhow::Result<usize> {
        let mut queues = self.queues.lock().await;
        let mut removed = 0;
        for k in keys {
            if queues.remove(k).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
