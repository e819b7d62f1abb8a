// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The context compactor: assembles the message list a step call sends to
//! the model from the durable iteration-state list, and trims both the
//! in-memory state list and individual tool outputs when utilization gets
//! tight.

use sealteam_model::Message;
use sealteam_state::{IterationState, ReflectDecision, Step};
use sealteam_tools::OutputCategory;

/// Full-detail window: the most recent `W` iterations are emitted in full.
pub const WINDOW: u32 = 5;
/// Iterations older than `current - TRIM_CUTOFF` have long tool outputs
/// trimmed to head/tail.
pub const TRIM_CUTOFF: u32 = 3;
pub const KEEP_HEAD_LINES: usize = 200;
pub const KEEP_TAIL_LINES: usize = 200;
pub const SOFT_RATIO: f64 = 0.70;
pub const HARD_RATIO: f64 = 0.90;
/// Textual outputs longer than this many lines are eligible for head/tail
/// trimming in semi-old iterations.
const TRIM_LINE_THRESHOLD: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    None,
    Soft,
    Hard,
}

/// Utilization estimate from the chars/4 heuristic, refreshed from the last
/// `Usage.input_tokens` reported by the model — the estimate is advisory,
/// not a safety limit (it sometimes underestimates).
pub fn check_compaction(used_tokens: u64, context_window: u32) -> Pressure {
    if context_window == 0 {
        return Pressure::None;
    }
    let ratio = used_tokens as f64 / context_window as f64;
    if ratio >= HARD_RATIO {
        Pressure::Hard
    } else if ratio >= SOFT_RATIO {
        Pressure::Soft
    } else {
        Pressure::None
    }
}

/// One-line summary of a completed iteration, extracted from its reflect
/// output when available, falling back to truncated plan/execute output.
fn summarize_iteration(iteration: u32, states: &[IterationState]) -> String {
    let reflect = states.iter().find(|s| s.step == Step::Reflect && s.iteration == iteration);
    if let Some(reflect) = reflect {
        if let Ok(decision) = serde_json::from_value::<ReflectDecision>(reflect.output.clone()) {
            let files = decision.summary.files_changed.join(", ");
            let decisions = decision.summary.decisions.join("; ");
            return format!(
                "[Iteration {iteration} summary] Plan: {} | Outcome: {} | Files: {} | Decisions: {}",
                truncate_chars(&decision.summary.plan, 200),
                truncate_chars(&decision.summary.outcome, 200),
                files,
                decisions
            );
        }
    }
    let plan = states
        .iter()
        .find(|s| s.step == Step::Plan && s.iteration == iteration)
        .map(|s| s.output.to_string())
        .unwrap_or_default();
    format!("[Iteration {iteration} summary] {}", truncate_chars(&plan, 300))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

/// Keep the first `KEEP_HEAD_LINES` and last `KEEP_TAIL_LINES` lines of a
/// textual value, recursing into JSON arrays/objects so a single huge field
/// nested inside a step's output doesn't escape the trim.
fn trim_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(trim_text(s)),
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(trim_value).collect()),
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), trim_value(v))).collect())
        }
        other => other.clone(),
    }
}

fn trim_text(s: &str) -> String {
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= TRIM_LINE_THRESHOLD {
        return s.to_string();
    }
    let head = &lines[..KEEP_HEAD_LINES.min(lines.len())];
    let tail_start = lines.len().saturating_sub(KEEP_TAIL_LINES);
    let tail = &lines[tail_start.max(head.len())..];
    let omitted = lines.len() - head.len() - tail.len();
    format!("{}\n[... {omitted} lines omitted ...]\n{}", head.join("\n"), tail.join("\n"))
}

/// Apply the same iteration-state trimming rule `assemble` uses for
/// semi-old iterations to the in-memory state list itself, producing a new
/// list. Invoked by the life loop on hard pressure before the next API call
/// and optionally on soft pressure after an iteration completes.
pub fn compact(states: &[IterationState], current_iter: u32) -> Vec<IterationState> {
    states
        .iter()
        .map(|s| {
            if s.iteration <= current_iter.saturating_sub(TRIM_CUTOFF) {
                let mut trimmed = s.clone();
                trimmed.input = trim_value(&s.input);
                trimmed.output = trim_value(&s.output);
                trimmed
            } else {
                s.clone()
            }
        })
        .collect()
}

/// Build the message list for the next step call: old iterations collapse
/// to one-line summaries, recent ones are emitted in full (trimmed if
/// semi-old), and the current turn's messages are appended.
pub fn assemble(iter_states: &[IterationState], current_messages: &[Message], current_iter: u32) -> Vec<Message> {
    let mut out = Vec::new();
    let mut iterations: Vec<u32> = iter_states.iter().map(|s| s.iteration).collect();
    iterations.sort_unstable();
    iterations.dedup();

    for iteration in iterations {
        if iteration + WINDOW <= current_iter {
            out.push(Message::user(summarize_iteration(iteration, iter_states)));
            out.push(Message::assistant("Acknowledged."));
            continue;
        }
        let semi_old = iteration + TRIM_CUTOFF <= current_iter;
        let mut steps: Vec<&IterationState> = iter_states.iter().filter(|s| s.iteration == iteration).collect();
        steps.sort_by_key(|s| s.step);
        for state in steps {
            let (input, output) = if semi_old {
                (trim_value(&state.input), trim_value(&state.output))
            } else {
                (state.input.clone(), state.output.clone())
            };
            out.push(Message::user(input.to_string()));
            out.push(Message::assistant(output.to_string()));
        }
    }

    out.extend(current_messages.iter().cloned());
    out
}

/// Truncate one tool output by category, the way `head_tail_truncate`
/// truncates shell output but generalized to every output shape the tool
/// host can emit.
pub fn truncate_tool_output(content: &str, category: OutputCategory, cap_chars: usize) -> String {
    if content.len() <= cap_chars {
        return content.to_string();
    }
    let omitted_bytes = content.len().saturating_sub(cap_chars);
    match category {
        OutputCategory::HeadTail | OutputCategory::FileContent => {
            let half = cap_chars / 2;
            let head_end = half.min(content.len());
            let tail_start = content.len().saturating_sub(half);
            format!(
                "{}\n[... ~{omitted_bytes} bytes omitted ...]\n{}",
                &content[..head_end],
                &content[tail_start.max(head_end)..]
            )
        }
        OutputCategory::MatchList => {
            let lines: Vec<&str> = content.lines().collect();
            let mut kept = String::new();
            for line in &lines {
                if kept.len() + line.len() + 1 > cap_chars {
                    break;
                }
                kept.push_str(line);
                kept.push('\n');
            }
            format!("{kept}[... more matches omitted; use a more specific pattern ...]")
        }
        OutputCategory::Generic => {
            let cut = content[..cap_chars.min(content.len())].rfind('\n').map(|p| p + 1).unwrap_or(cap_chars);
            format!("{}\n[... {omitted_bytes} bytes omitted ...]", &content[..cut])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealteam_state::{Complexity, IterationSummary, ReflectOutcome, TokenUsage};
    use serde_json::json;

    fn plan_state(iteration: u32) -> IterationState {
        IterationState {
            iteration,
            step: Step::Plan,
            timestamp: chrono::Utc::now(),
            input: json!({"system": "plan"}),
            output: json!({"plan": format!("plan for {iteration}"), "complexity": "simple"}),
            tokens_used: TokenUsage { input: 100, output: 50 },
            complexity: Some(Complexity::Simple),
        }
    }

    fn reflect_state(iteration: u32) -> IterationState {
        let decision = ReflectDecision {
            decision: ReflectOutcome::Continue,
            summary: IterationSummary {
                iteration,
                plan: "did the plan".into(),
                outcome: "succeeded".into(),
                files_changed: vec!["a.rs".into()],
                decisions: vec!["used approach X".into()],
            },
            next_message: None,
            error_details: None,
            cancelled: false,
        };
        IterationState {
            iteration,
            step: Step::Reflect,
            timestamp: chrono::Utc::now(),
            input: json!({}),
            output: serde_json::to_value(&decision).unwrap(),
            tokens_used: TokenUsage { input: 10, output: 10 },
            complexity: None,
        }
    }

    #[test]
    fn check_compaction_thresholds() {
        assert_eq!(check_compaction(100, 200_000), Pressure::None);
        assert_eq!(check_compaction(140_001, 200_000), Pressure::Soft);
        assert_eq!(check_compaction(180_001, 200_000), Pressure::Hard);
    }

    #[test]
    fn assemble_summarizes_iterations_outside_window() {
        let states = vec![plan_state(1), reflect_state(1)];
        let msgs = assemble(&states, &[], 1 + WINDOW);
        assert!(msgs[0].as_text().unwrap().contains("[Iteration 1 summary]"));
        assert!(msgs[0].as_text().unwrap().contains("Files: a.rs"));
    }

    #[test]
    fn assemble_keeps_recent_iterations_in_full() {
        let states = vec![plan_state(5)];
        let msgs = assemble(&states, &[], 5);
        assert!(msgs.iter().any(|m| m.as_text().map(|t| t.contains("plan for 5")).unwrap_or(false)));
    }

    #[test]
    fn assemble_appends_current_messages_last() {
        let states = vec![plan_state(1)];
        let current = vec![Message::user("current turn")];
        let msgs = assemble(&states, &current, 1);
        assert_eq!(msgs.last().unwrap().as_text(), Some("current turn"));
    }

    #[test]
    fn compact_trims_only_old_iterations() {
        let long_output = "line\n".repeat(500);
        let mut old = plan_state(1);
        old.output = json!(long_output);
        let mut recent = plan_state(10);
        recent.output = json!(long_output);

        let compacted = compact(&[old, recent], 10);
        let old_out = compacted[0].output.as_str().unwrap();
        let recent_out = compacted[1].output.as_str().unwrap();
        assert!(old_out.contains("omitted"));
        assert!(!recent_out.contains("omitted"));
    }

    #[test]
    fn truncate_tool_output_head_tail_preserves_both_ends() {
        let content = "x".repeat(10_000);
        let out = truncate_tool_output(&content, OutputCategory::HeadTail, 1000);
        assert!(out.contains("omitted"));
        assert!(out.len() < content.len());
    }

    #[test]
    fn truncate_tool_output_short_content_unchanged() {
        let out = truncate_tool_output("short", OutputCategory::Generic, 1000);
        assert_eq!(out, "short");
    }
}
