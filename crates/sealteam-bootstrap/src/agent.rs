// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turns a loaded [`AgentConfig`] into a runnable [`LifeLoop`]: picks the LLM
//! provider, connects the message bus, and assembles the tool registry. This
//! is the only place in the crate that converts config into live trait
//! objects — everything downstream of [`AgentBuilder::build`] only sees
//! [`sealteam_model::LlmClient`] and [`sealteam_queue::QueueBackend`].

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use sealteam_config::{AgentConfig, Config};
use sealteam_core::LifeLoop;
use sealteam_model::{AnthropicClient, LlmClient, MockLlmClient};
use sealteam_queue::{MockQueueBackend, QueueBackend, RedisQueueBackend};

pub struct AgentBuilder {
    agent: AgentConfig,
    session: Config,
    binary_path: PathBuf,
}

impl AgentBuilder {
    /// `session` is the session-wide config this agent was spawned under;
    /// `agent` is this process's own immutable record (usually loaded from
    /// the `AGENT_CONFIG` environment variable).
    pub fn new(agent: AgentConfig, session: Config) -> Self {
        let binary_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("sealteam"));
        Self { agent, session, binary_path }
    }

    /// Override the binary path the `spawn` tool uses for child processes.
    /// Defaults to the current executable; tests substitute a stub path.
    pub fn with_binary_path(mut self, path: PathBuf) -> Self {
        self.binary_path = path;
        self
    }

    fn build_llm_client(&self) -> anyhow::Result<Arc<dyn LlmClient>> {
        match self.session.model.provider.as_str() {
            "mock" => Ok(Arc::new(MockLlmClient::new(Vec::new()))),
            "anthropic" => {
                let api_key = env::var(&self.session.model.api_key_env).with_context(|| {
                    format!("missing required env var `{}`", self.session.model.api_key_env)
                })?;
                Ok(Arc::new(AnthropicClient::new(
                    api_key,
                    self.agent.model.clone(),
                    self.session.model.max_output_tokens,
                )))
            }
            other => anyhow::bail!("unknown model provider: {other}"),
        }
    }

    async fn build_queue_backend(&self) -> anyhow::Result<Arc<dyn QueueBackend>> {
        if self.agent.queue_url == "mock://" {
            return Ok(Arc::new(MockQueueBackend::new()));
        }
        let backend = RedisQueueBackend::connect(&self.agent.queue_url)
            .await
            .with_context(|| format!("connecting to message bus at {}", self.agent.queue_url))?;
        Ok(Arc::new(backend))
    }

    /// Assemble the agent's [`LifeLoop`], ready to be driven with
    /// [`LifeLoop::run`].
    pub async fn build(self) -> anyhow::Result<LifeLoop> {
        let llm = self.build_llm_client()?;
        let queue = self.build_queue_backend().await?;
        let mut tools = sealteam_tools::build_registry(
            queue.clone(),
            self.agent.workspace.clone(),
            self.agent.queue_url.clone(),
            self.agent.name.clone(),
            self.binary_path.clone(),
            self.session.model.name.clone(),
        );
        for entry in sealteam_tools::scan_dynamic(&self.agent.workspace).await.unwrap_or_default() {
            if let Some(tool) = sealteam_tools::DynamicTool::from_entry(&self.agent.workspace, &entry) {
                tools.register(tool);
            }
        }
        Ok(LifeLoop::new(self.agent, llm, queue, tools))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealteam_config::AgentRole;
    use tempfile::tempdir;

    fn agent(workspace: PathBuf) -> AgentConfig {
        AgentConfig {
            name: "alice".into(),
            role: AgentRole::Worker,
            purpose: "fix the flaky test".into(),
            allowed_tools: vec!["shell".into()],
            model: "claude-sonnet-4-5".into(),
            token_budget: 50_000,
            max_iterations: 20,
            max_tool_turns: 25,
            workspace,
            queue_url: "mock://".into(),
        }
    }

    #[tokio::test]
    async fn build_with_mock_provider_and_queue_succeeds() {
        let dir = tempdir().unwrap();
        let mut session = Config::default();
        session.model.provider = "mock".into();
        let builder = AgentBuilder::new(agent(dir.path().into()), session);
        assert!(builder.build().await.is_ok());
    }

    #[tokio::test]
    async fn anthropic_provider_without_api_key_env_fails() {
        let dir = tempdir().unwrap();
        let mut session = Config::default();
        session.model.api_key_env = "SEALTEAM_TEST_MISSING_KEY_VAR".into();
        let builder = AgentBuilder::new(agent(dir.path().into()), session);
        assert!(builder.build().await.is_err());
    }

    #[tokio::test]
    async fn unknown_provider_fails_fast() {
        let dir = tempdir().unwrap();
        let mut session = Config::default();
        session.model.provider = "not-a-real-provider".into();
        let builder = AgentBuilder::new(agent(dir.path().into()), session);
        assert!(builder.build().await.is_err());
    }
}
