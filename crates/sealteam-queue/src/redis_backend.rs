// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::backend::QueueBackend;

/// Reference [`QueueBackend`] wrapping a Redis-compatible (Valkey) server.
/// Uses [`ConnectionManager`] so a dropped connection is transparently
/// reestablished on the next command rather than failing the whole process.
pub struct RedisQueueBackend {
    conn: ConnectionManager,
}

impl RedisQueueBackend {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn lpush(&self, key: &str, value: String) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush(key, value).await?;
        Ok(())
    }

    async fn brpop(&self, key: &str, timeout_secs: u64) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> = conn.brpop(key, timeout_secs as f64).await?;
        Ok(result.map(|(_, v)| v))
    }

    async fn rpop(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.rpop(key, None).await?;
        Ok(result)
    }

    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let result: Vec<String> = conn.keys(pattern).await?;
        Ok(result)
    }

    async fn del(&self, keys: &[String]) -> anyhow::Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: usize = conn.del(keys).await?;
        Ok(removed)
    }
}
