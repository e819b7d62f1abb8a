// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System prompt templates for each life-loop step. Each builder embeds
//! the agent's role, purpose, and allowed tool names the same way the
//! shared identity block does, then layers on step-specific instructions.

use sealteam_config::{AgentConfig, AgentRole};

fn identity_block(agent: &AgentConfig) -> String {
    let role = match agent.role {
        AgentRole::Leader => "leader",
        AgentRole::Worker => "worker",
    };
    format!(
        "You are `{name}`, a {role} agent in a multi-agent engineering team.\n\
         Purpose: {purpose}\n\
         Allowed tools: {tools}\n\
         Token budget for this run: {budget}",
        name = agent.name,
        purpose = agent.purpose,
        tools = agent.allowed_tools.join(", "),
        budget = agent.token_budget,
    )
}

/// System prompt for the **Plan** step: produce a short plan and classify
/// the iteration's complexity.
pub fn plan_system_prompt(agent: &AgentConfig) -> String {
    format!(
        "{identity}\n\n\
         ## Planning\n\
         Decide what to do this iteration. Reply with a JSON object:\n\
         {{\"plan\": \"<what you intend to do>\", \"complexity\": \"simple\" | \"complex\"}}\n\
         Use `simple` when the work is a single clear action that can run through \
         the execute step without further planning; use `complex` when it needs \
         its own dedicated execute step after this one.",
        identity = identity_block(agent),
    )
}

/// System prompt for the **Execute** step, following a `complex` plan.
pub fn execute_system_prompt(agent: &AgentConfig, plan: &str) -> String {
    format!(
        "{identity}\n\n\
         ## Execution\n\
         Your plan for this iteration:\n{plan}\n\n\
         Carry it out using the tools available to you. Call tools as needed; \
         when the work described by the plan is done, reply with a short summary \
         of what changed and stop calling tools.",
        identity = identity_block(agent),
    )
}

/// System prompt for the **PlanExecute** fast path: state intent and act in
/// one call.
pub fn plan_execute_system_prompt(agent: &AgentConfig) -> String {
    format!(
        "{identity}\n\n\
         ## Plan and execute\n\
         State what you intend to do and carry it out in the same turn using \
         the tools available to you. When you are done, reply with a JSON object \
         trailing your summary on its own line:\n\
         {{\"next_complexity\": \"simple\" | \"complex\"}}\n\
         naming the complexity you expect the *next* iteration to need; default \
         to `simple` if you are unsure.",
        identity = identity_block(agent),
    )
}

/// System prompt for the **Reflect** step. `budget_warning` is set when
/// remaining budget is below 20%, per the iteration preamble's budget check.
pub fn reflect_system_prompt(agent: &AgentConfig, budget_warning: bool) -> String {
    let warning = if budget_warning {
        "\n\n## Budget warning\nYou are below 20% of your remaining token budget. \
         Strongly prefer `complete` over `continue` unless the remaining work is \
         small enough to finish within the budget that's left."
    } else {
        ""
    };
    format!(
        "{identity}\n\n\
         ## Reflection\n\
         Review what happened this iteration and decide what happens next. Reply \
         with a JSON object:\n\
         {{\"decision\": \"continue\" | \"complete\" | \"error\", \
         \"summary\": {{\"iteration\": <n>, \"plan\": \"...\", \"outcome\": \"...\", \
         \"files_changed\": [...], \"decisions\": [...]}}, \
         \"next_message\": \"<optional message to yourself for the next iteration>\", \
         \"error_details\": \"<optional, set when decision is error>\"}}{warning}",
        identity = identity_block(agent),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentConfig {
        AgentConfig {
            name: "alice".into(),
            role: AgentRole::Worker,
            purpose: "fix the flaky test".into(),
            allowed_tools: vec!["shell".into(), "read_file".into()],
            model: "claude-sonnet-4-5".into(),
            token_budget: 50_000,
            max_iterations: 20,
            max_tool_turns: 25,
            workspace: "/tmp/ws".into(),
            queue_url: "redis://127.0.0.1:6379".into(),
        }
    }

    #[test]
    fn plan_prompt_embeds_identity_and_tools() {
        let p = plan_system_prompt(&agent());
        assert!(p.contains("alice"));
        assert!(p.contains("shell, read_file"));
        assert!(p.contains("\"complexity\""));
    }

    #[test]
    fn execute_prompt_embeds_plan_text() {
        let p = execute_system_prompt(&agent(), "rewrite the assertion");
        assert!(p.contains("rewrite the assertion"));
    }

    #[test]
    fn reflect_prompt_includes_warning_only_when_requested() {
        let plain = reflect_system_prompt(&agent(), false);
        let warned = reflect_system_prompt(&agent(), true);
        assert!(!plain.contains("Budget warning"));
        assert!(warned.contains("Budget warning"));
    }
}
