// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The life loop: the plan/execute/reflect state machine every agent process
//! runs, adapted from a single chat-style agentic loop into a durable,
//! resumable, multi-step iteration cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sealteam_config::{AgentConfig, AgentRole};
use sealteam_model::{LlmClient, Message, Usage};
use sealteam_queue::{MessageType, QueueBackend, QueueMessage};
use sealteam_state::{
    Complexity, IterationState, ReflectDecision, ReflectOutcome, Step, TokenUsage,
};
use sealteam_tools::{OutputCategory, ToolCall, ToolRegistry};
use serde_json::json;
use tracing::{info, warn};

use crate::compact::{self, Pressure};
use crate::json_repair::attempt_json_repair;
use crate::prompts;

/// Tool sub-loop compaction policy: collapse all but the most recent `K`
/// tool-call/result pairs once the loop grows past that.
const SUBLOOP_COMPACT_KEEP: usize = 4;
const MAX_IDLE_CYCLES: u32 = 30;
const SELF_RECOVERY_LIMIT: u32 = 3;
const RECEIVE_TIMEOUT_SECS: u64 = 5;
const TOOL_OUTPUT_CAP_CHARS: usize = 20_000;

/// What the iteration preamble decided: keep going, or the whole loop should
/// return.
enum PreambleOutcome {
    Proceed,
    Terminate,
}

/// What `decide` concluded after a reflect step.
enum Decision {
    Continue { next_message: Option<String> },
    Complete,
    Error,
}

pub struct LifeLoop {
    agent: AgentConfig,
    llm: Arc<dyn LlmClient>,
    queue: Arc<dyn QueueBackend>,
    tools: ToolRegistry,
    agent_dir: PathBuf,
    states: Vec<IterationState>,
    tokens_used_total: u64,
    last_input_tokens: u64,
    idle_count: u32,
    self_recovery_count: u32,
}

impl LifeLoop {
    pub fn new(agent: AgentConfig, llm: Arc<dyn LlmClient>, queue: Arc<dyn QueueBackend>, tools: ToolRegistry) -> Self {
        let agent_dir = agent.workspace.join(&agent.name);
        Self {
            agent,
            llm,
            queue,
            tools,
            agent_dir,
            states: Vec::new(),
            tokens_used_total: 0,
            last_input_tokens: 0,
            idle_count: 0,
            self_recovery_count: 0,
        }
    }

    /// Run until the loop decides `complete`, exhausts its budget/iteration
    /// cap, or is cancelled. Crash recovery via `RESUME_FROM` happens here.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (mut iteration, mut last_complexity) = self.recover_start().await?;

        loop {
            match self.iteration_preamble(iteration).await? {
                PreambleOutcome::Terminate => return Ok(()),
                PreambleOutcome::Proceed => {}
            }

            let fast_path = iteration > 1 && last_complexity == Complexity::Simple;
            let (summary_text, next_complexity) = if fast_path {
                self.plan_execute_step(iteration).await?
            } else {
                let (plan_text, complexity) = self.plan_step(iteration).await?;
                let summary = self.execute_step(iteration, &plan_text).await?;
                (summary, complexity)
            };
            info!(iteration, %summary_text, "iteration work complete");

            let decision = self.reflect_step(iteration).await?;
            match self.decide(iteration, decision).await? {
                Decision::Continue { next_message } => {
                    if let Some(msg) = next_message {
                        self.enqueue_self(iteration, msg).await?;
                    }
                    self.self_recovery_count = 0;
                    last_complexity = next_complexity;
                    iteration += 1;
                }
                Decision::Complete => return Ok(()),
                Decision::Error => {
                    // `decide` already incremented/reset the counter and sent
                    // whatever escalation was needed; keep going either way.
                    last_complexity = Complexity::Complex;
                    iteration += 1;
                }
            }
        }
    }

    /// Apply `RESUME_FROM=i-step`, if set, per spec.md §4.6.5: preload every
    /// completed iteration's state, then resume either at `i+1` (if the last
    /// completed step was reflect) or re-run iteration `i` from plan.
    async fn recover_start(&mut self) -> anyhow::Result<(u32, Complexity)> {
        let Ok(resume_from) = std::env::var("RESUME_FROM") else {
            return Ok((1, Complexity::Complex));
        };
        let (i_str, step_str) = resume_from
            .split_once('-')
            .with_context(|| format!("malformed RESUME_FROM: {resume_from}"))?;
        let last_i: u32 = i_str.parse().with_context(|| format!("malformed RESUME_FROM iteration: {i_str}"))?;
        let last_step = Step::from_file_fragment(step_str)
            .with_context(|| format!("malformed RESUME_FROM step: {step_str}"))?;

        for i in 1..=last_i {
            for step in [Step::Plan, Step::Execute, Step::PlanExecute, Step::Reflect] {
                if let Some(state) = sealteam_state::read_iteration_state(&self.agent_dir, i, step).await? {
                    self.states.push(state);
                }
            }
        }

        if last_step == Step::Reflect {
            let plan = self.states.iter().find(|s| s.iteration == last_i && s.step == Step::Plan);
            let complexity = plan.and_then(|p| p.complexity).unwrap_or(Complexity::Complex);
            Ok((last_i + 1, complexity))
        } else {
            Ok((last_i, Complexity::Complex))
        }
    }

    async fn iteration_preamble(&mut self, iteration: u32) -> anyhow::Result<PreambleOutcome> {
        if self.tokens_used_total >= self.agent.token_budget {
            let (msg_type, to) = match self.agent.role {
                AgentRole::Worker => (MessageType::Status, "main"),
                AgentRole::Leader => (MessageType::AllComplete, "main"),
            };
            self.send(to, msg_type, "token budget exhausted").await?;
            return Ok(PreambleOutcome::Terminate);
        }
        if iteration > self.agent.max_iterations {
            return Ok(PreambleOutcome::Terminate);
        }

        match sealteam_queue::receive(self.queue.as_ref(), &self.agent.name, RECEIVE_TIMEOUT_SECS).await? {
            Some(msg) if msg.message_type == MessageType::Cancel => {
                self.handle_cancel(iteration, &msg.content).await?;
                return Ok(PreambleOutcome::Terminate);
            }
            Some(_) => {
                self.idle_count = 0;
            }
            None => {
                self.idle_count += 1;
                if let Some(msg) = sealteam_queue::receive_non_blocking(self.queue.as_ref(), &self.agent.name).await? {
                    if msg.message_type == MessageType::Cancel {
                        self.handle_cancel(iteration, &msg.content).await?;
                        return Ok(PreambleOutcome::Terminate);
                    }
                    sealteam_queue::send(self.queue.as_ref(), msg, Some(&self.agent.workspace)).await?;
                }
                if self.idle_count >= MAX_IDLE_CYCLES {
                    self.send("bob", MessageType::Status, "idle, requesting direction").await?;
                    self.idle_count = 0;
                }
            }
        }

        if self.pressure() == Pressure::Hard {
            self.states = compact::compact(&self.states, iteration);
        }

        Ok(PreambleOutcome::Proceed)
    }

    async fn handle_cancel(&mut self, iteration: u32, reason: &str) -> anyhow::Result<()> {
        let decision = ReflectDecision {
            decision: ReflectOutcome::Complete,
            summary: sealteam_state::IterationSummary {
                iteration,
                plan: String::new(),
                outcome: "cancelled".into(),
                files_changed: vec![],
                decisions: vec![],
            },
            next_message: None,
            error_details: None,
            cancelled: true,
        };
        let state = IterationState {
            iteration,
            step: Step::Reflect,
            timestamp: chrono::Utc::now(),
            input: json!({ "reason": reason }),
            output: serde_json::to_value(&decision)?,
            tokens_used: TokenUsage::default(),
            complexity: None,
        };
        sealteam_state::write_iteration_state(&self.agent_dir, &state).await?;
        self.commit_in_progress_work().await;
        self.send("bob", MessageType::Complete, &format!("cancelled: {reason}")).await?;
        Ok(())
    }

    /// Best-effort `git add -A && git commit` of whatever is on disk in
    /// this agent's working tree before exiting on cancellation. Failure
    /// (nothing to commit, not a repo, etc.) is swallowed: this is a
    /// convenience save, not a correctness requirement.
    async fn commit_in_progress_work(&self) {
        let dir = self.agent_dir.to_string_lossy().into_owned();
        let add = tokio::process::Command::new("git")
            .args(["add", "-A"])
            .current_dir(&dir)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
        if !matches!(add, Ok(o) if o.status.success()) {
            return;
        }
        let _ = tokio::process::Command::new("git")
            .args(["commit", "-m", "wip: cancelled mid-iteration"])
            .current_dir(&dir)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
    }

    fn pressure(&self) -> Pressure {
        let window = sealteam_model::context_window_for(&self.agent.model);
        compact::check_compaction(self.last_input_tokens, window)
    }

    async fn plan_step(&mut self, iteration: u32) -> anyhow::Result<(String, Complexity)> {
        let system = prompts::plan_system_prompt(&self.agent);
        let messages = compact::assemble(&self.states, &[], iteration);
        let resp = sealteam_model::infer_with_retry(self.llm.as_ref(), &system, &messages, &[]).await?;
        self.accumulate(&resp.usage);

        let (plan_text, complexity) = parse_plan_response(&resp.text());

        self.record_step(iteration, Step::Plan, json!({ "system": system }), json!({ "plan": plan_text, "complexity": complexity }), &resp.usage, Some(complexity)).await?;
        Ok((plan_text, complexity))
    }

    async fn execute_step(&mut self, iteration: u32, plan: &str) -> anyhow::Result<String> {
        let system = prompts::execute_system_prompt(&self.agent, plan);
        let initial = compact::assemble(&self.states, &[Message::user(format!("Begin executing: {plan}"))], iteration);
        let (text, usage) = self.run_tool_subloop(&system, initial).await?;
        self.record_step(iteration, Step::Execute, json!({ "plan": plan }), json!({ "summary": text }), &usage, None).await?;
        Ok(text)
    }

    async fn plan_execute_step(&mut self, iteration: u32) -> anyhow::Result<(String, Complexity)> {
        let system = prompts::plan_execute_system_prompt(&self.agent);
        let initial = compact::assemble(&self.states, &[Message::user("Plan and execute this iteration.")], iteration);
        let (text, usage) = self.run_tool_subloop(&system, initial).await?;
        let next_complexity = parse_next_complexity(&text);
        self.record_step(
            iteration,
            Step::PlanExecute,
            json!({}),
            json!({ "summary": text, "next_complexity": next_complexity }),
            &usage,
            Some(next_complexity),
        )
        .await?;
        Ok((text, next_complexity))
    }

    async fn reflect_step(&mut self, iteration: u32) -> anyhow::Result<ReflectDecision> {
        let remaining_ratio = 1.0 - (self.tokens_used_total as f64 / self.agent.token_budget.max(1) as f64);
        let budget_warning = remaining_ratio < 0.20;
        let system = prompts::reflect_system_prompt(&self.agent, budget_warning);
        let messages = compact::assemble(&self.states, &[Message::user("Reflect on this iteration.")], iteration);
        let resp = sealteam_model::infer_with_retry(self.llm.as_ref(), &system, &messages, &[]).await?;
        self.accumulate(&resp.usage);

        let decision = parse_reflect_response(&resp.text());
        self.record_step(iteration, Step::Reflect, json!({ "system": system }), serde_json::to_value(&decision)?, &resp.usage, None).await?;
        Ok(decision)
    }

    async fn decide(&mut self, iteration: u32, decision: ReflectDecision) -> anyhow::Result<Decision> {
        match decision.decision {
            ReflectOutcome::Continue => Ok(Decision::Continue { next_message: decision.next_message }),
            ReflectOutcome::Complete => {
                self.send("bob", MessageType::Complete, "iteration work complete").await?;
                Ok(Decision::Complete)
            }
            ReflectOutcome::Error => {
                self.self_recovery_count += 1;
                if self.self_recovery_count < SELF_RECOVERY_LIMIT {
                    self.enqueue_self(iteration, "retry after error".to_string()).await?;
                } else {
                    let detail = decision.error_details.unwrap_or_else(|| "unspecified error".into());
                    self.send("bob", MessageType::Error, &detail).await?;
                    self.self_recovery_count = 0;
                }
                Ok(Decision::Error)
            }
        }
    }

    async fn enqueue_self(&self, _iteration: u32, content: String) -> anyhow::Result<()> {
        self.send(&self.agent.name, MessageType::Task, &content).await
    }

    async fn send(&self, to: &str, message_type: MessageType, content: &str) -> anyhow::Result<()> {
        let msg = QueueMessage::new(&self.agent.name, to, message_type, content);
        sealteam_queue::send(self.queue.as_ref(), msg, Some(&self.agent.workspace)).await?;
        Ok(())
    }

    fn accumulate(&mut self, usage: &Usage) {
        self.tokens_used_total += (usage.input_tokens + usage.output_tokens) as u64;
        self.last_input_tokens = usage.input_tokens as u64;
    }

    async fn record_step(
        &mut self,
        iteration: u32,
        step: Step,
        input: serde_json::Value,
        output: serde_json::Value,
        usage: &Usage,
        complexity: Option<Complexity>,
    ) -> anyhow::Result<()> {
        let state = IterationState {
            iteration,
            step,
            timestamp: chrono::Utc::now(),
            input,
            output,
            tokens_used: TokenUsage { input: usage.input_tokens as u64, output: usage.output_tokens as u64 },
            complexity,
        };
        sealteam_state::write_iteration_state(&self.agent_dir, &state).await?;
        self.states.push(state);
        Ok(())
    }

    /// The tool sub-loop shared by `Execute` and `PlanExecute`: drives model
    /// turns until it stops requesting tools or `max_tool_turns` is hit,
    /// executing tool calls concurrently and feeding results back.
    async fn run_tool_subloop(&mut self, system: &str, mut messages: Vec<Message>) -> anyhow::Result<(String, Usage)> {
        let initial_context_size = messages.len();
        let allowed = &self.agent.allowed_tools;
        let mut schemas = self.tools.local_tool_defs(self.agent.role, allowed);
        schemas.extend(self.tools.server_tool_specs(allowed));

        let max_turns = match self.agent.role {
            AgentRole::Leader => 75u32.max(self.agent.max_tool_turns),
            AgentRole::Worker => self.agent.max_tool_turns,
        };

        let mut total_usage = Usage::default();
        let mut turns = 0u32;

        loop {
            turns += 1;
            let resp = sealteam_model::infer_with_retry(self.llm.as_ref(), system, &messages, &schemas).await?;
            total_usage.input_tokens += resp.usage.input_tokens;
            total_usage.output_tokens += resp.usage.output_tokens;
            self.accumulate(&resp.usage);

            let tool_calls = resp.tool_calls();
            if tool_calls.is_empty() {
                return Ok((resp.text(), total_usage));
            }

            if turns >= max_turns {
                return Ok((format!("Tool loop terminated after {turns} turns without a final answer"), total_usage));
            }

            // Local tool calls only: server-hosted ones are skipped entirely
            // (no tool_call/tool_result pair), since the provider already
            // resolved them as part of this same turn.
            let local_calls: Vec<(String, String, String)> = tool_calls
                .iter()
                .filter(|(_, name, _)| !self.tools.is_server_tool(name))
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.to_string()))
                .collect();

            // Phase 1: push each local tool call as an assistant message,
            // preserving request order.
            for (id, name, args) in &local_calls {
                messages.push(Message::tool_call(id, name, args));
            }

            // Phase 2: execute concurrently via `tokio::spawn`, one task per
            // call; a panicking task becomes an error result instead of
            // aborting the whole iteration.
            let outputs = self.execute_tool_calls(&local_calls).await;

            // Phase 3: append truncated tool results in request order.
            for output in outputs {
                let category = output.category.map(|c| c.0).unwrap_or(OutputCategory::Generic);
                let truncated = compact::truncate_tool_output(&output.content, category, TOOL_OUTPUT_CAP_CHARS);
                messages.push(Message::tool_result(output.tool_call_id, truncated));
            }

            maybe_compact_subloop(&mut messages, initial_context_size);
        }
    }

    async fn execute_tool_calls(&self, calls: &[(String, String, String)]) -> Vec<sealteam_tools::ToolOutput> {
        let mut handles = Vec::with_capacity(calls.len());
        for (id, name, args) in calls {
            let parsed_args = attempt_json_repair(args).unwrap_or_else(|_| json!({}));
            let call = ToolCall { id: id.clone(), name: name.clone(), args: parsed_args };
            match self.tools.get(name) {
                Some(tool) => handles.push((id.clone(), tokio::spawn(async move { tool.execute(&call).await }))),
                None => {
                    let msg = format!("unknown tool: {name}");
                    handles.push((id.clone(), tokio::spawn(async move { sealteam_tools::ToolOutput::err(&call.id, msg) })));
                }
            }
        }
        let mut outputs = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(out) => outputs.push(out),
                Err(e) => outputs.push(sealteam_tools::ToolOutput::err(&id, format!("tool panicked: {e}"))),
            }
        }
        outputs
    }
}

fn maybe_compact_subloop(messages: &mut Vec<Message>, initial_context_size: usize) {
    // Each tool round contributes one assistant tool-call message and one
    // user tool-result message, so a "pair" is 2 entries.
    let tail = &messages[initial_context_size..];
    let pairs = tail.len() / 2;
    if pairs <= SUBLOOP_COMPACT_KEEP {
        return;
    }
    let keep_from = initial_context_size + (pairs - SUBLOOP_COMPACT_KEEP) * 2;
    let compacted_count = pairs - SUBLOOP_COMPACT_KEEP;
    let mut rebuilt = messages[..initial_context_size].to_vec();
    rebuilt.push(Message::user(format!("[Compacted {compacted_count} tool turns]")));
    rebuilt.push(Message::assistant("Acknowledged."));
    rebuilt.extend_from_slice(&messages[keep_from..]);
    *messages = rebuilt;
}

fn parse_plan_response(text: &str) -> (String, Complexity) {
    match serde_json::from_str::<serde_json::Value>(text).or_else(|_| attempt_json_repair(text)) {
        Ok(v) => {
            let plan = v.get("plan").and_then(|p| p.as_str()).unwrap_or(text).to_string();
            let complexity = match v.get("complexity").and_then(|c| c.as_str()) {
                Some("simple") => Complexity::Simple,
                _ => Complexity::Complex,
            };
            (plan, complexity)
        }
        Err(_) => (text.to_string(), Complexity::Complex),
    }
}

fn parse_next_complexity(text: &str) -> Complexity {
    let tail = text.lines().last().unwrap_or("");
    match serde_json::from_str::<serde_json::Value>(tail).or_else(|_| attempt_json_repair(tail)) {
        Ok(v) => match v.get("next_complexity").and_then(|c| c.as_str()) {
            Some("complex") => Complexity::Complex,
            _ => Complexity::Simple,
        },
        Err(_) => Complexity::Simple,
    }
}

fn parse_reflect_response(text: &str) -> ReflectDecision {
    match serde_json::from_str::<ReflectDecision>(text) {
        Ok(d) => d,
        Err(_) => match attempt_json_repair(text).and_then(|v| Ok(serde_json::from_value::<ReflectDecision>(v)?)) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "reflect output was not valid JSON, retrying next iteration");
                ReflectDecision {
                    decision: ReflectOutcome::Continue,
                    summary: sealteam_state::IterationSummary {
                        iteration: 0,
                        plan: String::new(),
                        outcome: String::new(),
                        files_changed: vec![],
                        decisions: vec![],
                    },
                    next_message: Some("Retry — reflection output was not valid JSON.".into()),
                    error_details: None,
                    cancelled: false,
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealteam_model::MockLlmClient;
    use sealteam_queue::MockQueueBackend;
    use tempfile::tempdir;

    fn agent(name: &str, workspace: &Path) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            role: AgentRole::Worker,
            purpose: "test".into(),
            allowed_tools: vec![],
            model: "mock-model".into(),
            token_budget: 1_000_000,
            max_iterations: 5,
            max_tool_turns: 10,
            workspace: workspace.into(),
            queue_url: "redis://127.0.0.1:6379".into(),
        }
    }

    #[test]
    fn parse_plan_response_defaults_to_complex_on_bad_json() {
        let (plan, complexity) = parse_plan_response("not json at all");
        assert_eq!(plan, "not json at all");
        assert_eq!(complexity, Complexity::Complex);
    }

    #[test]
    fn parse_plan_response_reads_simple_complexity() {
        let (plan, complexity) = parse_plan_response(r#"{"plan": "do x", "complexity": "simple"}"#);
        assert_eq!(plan, "do x");
        assert_eq!(complexity, Complexity::Simple);
    }

    #[test]
    fn parse_reflect_response_falls_back_on_bad_json() {
        let decision = parse_reflect_response("garbage");
        assert_eq!(decision.decision, ReflectOutcome::Continue);
        assert!(decision.next_message.unwrap().contains("not valid JSON"));
    }

    #[test]
    fn maybe_compact_subloop_collapses_older_pairs() {
        let mut messages = vec![Message::user("initial")];
        let initial = messages.len();
        for i in 0..8 {
            messages.push(Message::tool_call(format!("{i}"), "shell", "{}"));
            messages.push(Message::tool_result(format!("{i}"), "ok"));
        }
        maybe_compact_subloop(&mut messages, initial);
        assert!(messages.iter().any(|m| m.as_text().map(|t| t.contains("Compacted")).unwrap_or(false)));
        // initial message + compaction ack pair + most recent K pairs * 2
        assert_eq!(messages.len(), 1 + 2 + SUBLOOP_COMPACT_KEEP * 2);
    }

    #[tokio::test]
    async fn recover_start_without_resume_from_starts_at_iteration_one() {
        let dir = tempdir().unwrap();
        let a = agent("worker-1", dir.path());
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let queue: Arc<dyn QueueBackend> = Arc::new(MockQueueBackend::new());
        let mut life = LifeLoop::new(a, llm, queue, ToolRegistry::new());
        let (iteration, complexity) = life.recover_start().await.unwrap();
        assert_eq!(iteration, 1);
        assert_eq!(complexity, Complexity::Complex);
    }
}
