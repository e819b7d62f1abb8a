// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which role an agent plays in a session.
///
/// The leader decomposes the goal and spawns workers; workers execute a
/// delegated sub-task and report back. Every role runs the same life loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Leader,
    Worker,
}

impl Default for AgentRole {
    fn default() -> Self {
        AgentRole::Worker
    }
}

/// Model selection and provider wiring for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model_name() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_max_output_tokens() -> u32 {
    8192
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            api_key_env: default_api_key_env(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Compaction thresholds for the context compactor.
///
/// `window` and `trim_cutoff` are iteration counts, not tokens: the most
/// recent `window` iterations keep full step detail; iterations older than
/// `trim_cutoff` have their tool results reduced to head/tail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_window")]
    pub window: u32,
    #[serde(default = "default_trim_cutoff")]
    pub trim_cutoff: u32,
    #[serde(default = "default_soft_ratio")]
    pub soft_ratio: f64,
    #[serde(default = "default_hard_ratio")]
    pub hard_ratio: f64,
    #[serde(default = "default_keep_lines")]
    pub keep_head_lines: usize,
    #[serde(default = "default_keep_lines")]
    pub keep_tail_lines: usize,
}

fn default_window() -> u32 {
    5
}
fn default_trim_cutoff() -> u32 {
    3
}
fn default_soft_ratio() -> f64 {
    0.70
}
fn default_hard_ratio() -> f64 {
    0.90
}
fn default_keep_lines() -> usize {
    200
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            trim_cutoff: default_trim_cutoff(),
            soft_ratio: default_soft_ratio(),
            hard_ratio: default_hard_ratio(),
            keep_head_lines: default_keep_lines(),
            keep_tail_lines: default_keep_lines(),
        }
    }
}

/// Tool approval policy, shared by every agent in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_auto_approve")]
    pub auto_approve_patterns: Vec<String>,
    #[serde(default)]
    pub deny_patterns: Vec<String>,
}

fn default_auto_approve() -> Vec<String> {
    vec!["ls *".to_string(), "cat *".to_string(), "git status".to_string()]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve_patterns: default_auto_approve(),
            deny_patterns: Vec::new(),
        }
    }
}

/// Session-wide knobs loaded from the config file / env and overridable per
/// CLI flag, matching the flag table in the external interfaces design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default = "default_queue_url")]
    pub queue_url: String,
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: u32,
    #[serde(default = "default_max_idle_cycles")]
    pub max_idle_cycles: u32,
}

fn default_queue_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_token_budget() -> u64 {
    500_000
}
fn default_max_iterations() -> u32 {
    50
}
fn default_max_tool_turns() -> u32 {
    20
}
fn default_max_idle_cycles() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            compaction: CompactionConfig::default(),
            tools: ToolsConfig::default(),
            queue_url: default_queue_url(),
            token_budget: default_token_budget(),
            max_iterations: default_max_iterations(),
            max_tool_turns: default_max_tool_turns(),
            max_idle_cycles: default_max_idle_cycles(),
        }
    }
}

/// Immutable per-agent record, serialized to the child process's
/// `AGENT_CONFIG` environment variable at spawn time and never mutated
/// after that (any drift must go through a fresh `IterationState`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub role: AgentRole,
    pub purpose: String,
    pub allowed_tools: Vec<String>,
    pub model: String,
    pub token_budget: u64,
    pub max_iterations: u32,
    pub max_tool_turns: u32,
    pub workspace: PathBuf,
    pub queue_url: String,
}
