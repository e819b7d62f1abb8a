// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sealteam_config::AgentConfig;

/// A step within one iteration of the life loop. Ordered `Plan < Execute <
/// PlanExecute < Reflect`; the ordering is what `last_completed_step` uses
/// to find the most recently finished step within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Plan,
    Execute,
    PlanExecute,
    Reflect,
}

impl Step {
    /// The filename fragment used under `state/iteration-<n>-<step>.json`.
    pub fn as_file_fragment(&self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::Execute => "execute",
            Step::PlanExecute => "plan-execute",
            Step::Reflect => "reflect",
        }
    }

    pub fn from_file_fragment(s: &str) -> Option<Step> {
        match s {
            "plan" => Some(Step::Plan),
            "execute" => Some(Step::Execute),
            "plan-execute" => Some(Step::PlanExecute),
            "reflect" => Some(Step::Reflect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Complexity {
    Simple,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// The durable record of one step's inputs, outputs, and cost. Written once,
/// never mutated, keyed by `(iteration, step)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    pub iteration: u32,
    pub step: Step,
    pub timestamp: DateTime<Utc>,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub tokens_used: TokenUsage,
    pub complexity: Option<Complexity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReflectOutcome {
    Continue,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: u32,
    pub plan: String,
    pub outcome: String,
    pub files_changed: Vec<String>,
    pub decisions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectDecision {
    pub decision: ReflectOutcome,
    pub summary: IterationSummary,
    pub next_message: Option<String>,
    pub error_details: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSessionEntry {
    pub config: AgentConfig,
    pub pid: u32,
    pub status: AgentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// The whole-session record written by the supervisor. `status` is derived
/// (see [`SessionState::derive_status`]), never written independently of the
/// agent entries it is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub goal: String,
    pub start_time: DateTime<Utc>,
    pub workspace: std::path::PathBuf,
    pub queue_url: String,
    pub status: SessionStatus,
    pub agents: Vec<AgentSessionEntry>,
}

impl SessionState {
    /// Running iff at least one agent is still Running; Failed iff any agent
    /// Failed and none are Running; Completed otherwise (including the
    /// vacuous case of zero agents, which never occurs once the leader has
    /// been spawned).
    pub fn derive_status(&self) -> SessionStatus {
        if self.agents.iter().any(|a| a.status == AgentStatus::Running) {
            SessionStatus::Running
        } else if self.agents.iter().any(|a| a.status == AgentStatus::Failed) {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        }
    }

    pub fn running_agent_names(&self, exclude: &str) -> Vec<String> {
        self.agents
            .iter()
            .filter(|a| a.status == AgentStatus::Running && a.config.name != exclude)
            .map(|a| a.config.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_ordering_matches_life_loop_sequence() {
        assert!(Step::Plan < Step::Execute);
        assert!(Step::Execute < Step::PlanExecute);
        assert!(Step::PlanExecute < Step::Reflect);
    }

    #[test]
    fn step_file_fragment_round_trips() {
        for step in [Step::Plan, Step::Execute, Step::PlanExecute, Step::Reflect] {
            let frag = step.as_file_fragment();
            assert_eq!(Step::from_file_fragment(frag), Some(step));
        }
    }

    #[test]
    fn token_usage_total_sums_input_and_output() {
        let u = TokenUsage { input: 100, output: 50 };
        assert_eq!(u.total(), 150);
    }

    #[test]
    fn derive_status_running_if_any_agent_running() {
        let s = session_with_statuses(&[AgentStatus::Completed, AgentStatus::Running]);
        assert_eq!(s.derive_status(), SessionStatus::Running);
    }

    #[test]
    fn derive_status_failed_if_any_failed_and_none_running() {
        let s = session_with_statuses(&[AgentStatus::Completed, AgentStatus::Failed]);
        assert_eq!(s.derive_status(), SessionStatus::Failed);
    }

    #[test]
    fn derive_status_completed_if_all_completed() {
        let s = session_with_statuses(&[AgentStatus::Completed, AgentStatus::Completed]);
        assert_eq!(s.derive_status(), SessionStatus::Completed);
    }

    fn session_with_statuses(statuses: &[AgentStatus]) -> SessionState {
        use sealteam_config::{AgentRole};
        let agents = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| AgentSessionEntry {
                config: AgentConfig {
                    name: format!("agent-{i}"),
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
                pid: 1000 + i as u32,
                status: *status,
                start_time: Utc::now(),
                end_time: None,
            })
            .collect();
        SessionState {
            goal: "test".into(),
            start_time: Utc::now(),
            workspace: "/tmp".into(),
            queue_url: "redis://127.0.0.1:6379".into(),
            status: SessionStatus::Running,
            agents,
        }
    }
}
