// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

/// The narrow capability set the message bus needs from a queue backend.
/// The reference implementation ([`crate::RedisQueueBackend`]) talks to a
/// Redis-compatible list server; [`crate::MockQueueBackend`] is an in-memory
/// stand-in satisfying the same contract for tests.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Push `value` onto the head of `key` (FIFO when popped from the tail).
    async fn lpush(&self, key: &str, value: String) -> anyhow::Result<()>;

    /// Block up to `timeout_secs` popping from the tail of `key`.
    /// `timeout_secs == 0` blocks indefinitely.
    async fn brpop(&self, key: &str, timeout_secs: u64) -> anyhow::Result<Option<String>>;

    /// Pop from the tail of `key` without blocking.
    async fn rpop(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// List keys matching `pattern` (e.g. `"queue:*"`).
    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>>;

    /// Delete the given keys; returns the number actually removed.
    async fn del(&self, keys: &[String]) -> anyhow::Result<usize>;
}
