// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{SessionState, Step};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn state_dir(agent_dir: &Path) -> PathBuf {
    agent_dir.join("state")
}

fn iteration_path(agent_dir: &Path, iteration: u32, step: Step) -> PathBuf {
    state_dir(agent_dir).join(format!(
        "iteration-{iteration}-{}.json",
        step.as_file_fragment()
    ))
}

/// Atomically overwrite `path` with `contents`: write to a sibling `.tmp`
/// file first, then rename. State files are never mutated in place.
async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StateStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StateStoreError::Io { path: path.to_path_buf(), source: e })?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StateStoreError::Io { path: tmp.clone(), source: e })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StateStoreError::Io { path: path.to_path_buf(), source: e })?;
    Ok(())
}

/// Retry a transient I/O operation once after a short delay, matching the
/// teacher's general backoff-on-transient-failure shape.
async fn with_one_retry<F, Fut, T>(mut f: F) -> Result<T, StateStoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StateStoreError>>,
{
    match f().await {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(error = %e, "state store op failed, retrying once");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            f().await
        }
    }
}

pub async fn write_iteration_state(
    agent_dir: &Path,
    state: &crate::IterationState,
) -> Result<(), StateStoreError> {
    let path = iteration_path(agent_dir, state.iteration, state.step);
    let contents = serde_json::to_vec_pretty(state)
        .map_err(|e| StateStoreError::Parse { path: path.clone(), source: e })?;
    with_one_retry(|| async { atomic_write(&path, &contents).await }).await?;
    debug!(iteration = state.iteration, step = ?state.step, "wrote iteration state");
    Ok(())
}

pub async fn read_iteration_state(
    agent_dir: &Path,
    iteration: u32,
    step: Step,
) -> Result<Option<crate::IterationState>, StateStoreError> {
    let path = iteration_path(agent_dir, iteration, step);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let state = serde_json::from_slice(&bytes)
                .map_err(|e| StateStoreError::Parse { path: path.clone(), source: e })?;
            Ok(Some(state))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateStoreError::Io { path, source: e }),
    }
}

/// Scan `state/iteration-<n>-<step>.json` and return the highest
/// `(iteration, step)` pair, using `Step`'s `Plan < Execute < PlanExecute <
/// Reflect` ordering to break ties within an iteration.
pub async fn last_completed_step(agent_dir: &Path) -> Result<Option<(u32, Step)>, StateStoreError> {
    let dir = state_dir(agent_dir);
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StateStoreError::Io { path: dir, source: e }),
    };

    let mut best: Option<(u32, Step)> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StateStoreError::Io { path: dir.clone(), source: e })?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(parsed) = parse_iteration_filename(&name) {
            best = Some(match best {
                Some(b) if b >= parsed => b,
                _ => parsed,
            });
        }
    }
    Ok(best)
}

fn parse_iteration_filename(name: &str) -> Option<(u32, Step)> {
    let stem = name.strip_suffix(".json")?;
    let rest = stem.strip_prefix("iteration-")?;
    let (num, frag) = rest.split_once('-')?;
    let iteration: u32 = num.parse().ok()?;
    let step = Step::from_file_fragment(frag)?;
    Some((iteration, step))
}

pub async fn write_session_state(
    workspace: &Path,
    state: &SessionState,
) -> Result<(), StateStoreError> {
    let path = workspace.join("session.json");
    let contents = serde_json::to_vec_pretty(state)
        .map_err(|e| StateStoreError::Parse { path: path.clone(), source: e })?;
    with_one_retry(|| async { atomic_write(&path, &contents).await }).await
}

pub async fn read_session_state(workspace: &Path) -> Result<Option<SessionState>, StateStoreError> {
    let path = workspace.join("session.json");
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let state = serde_json::from_slice(&bytes)
                .map_err(|e| StateStoreError::Parse { path: path.clone(), source: e })?;
            Ok(Some(state))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateStoreError::Io { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Complexity, IterationState, TokenUsage};
    use serde_json::json;
    use tempfile::tempdir;

    fn make_state(iteration: u32, step: Step) -> IterationState {
        IterationState {
            iteration,
            step,
            timestamp: chrono::Utc::now(),
            input: json!({"x": 1}),
            output: json!({"y": 2}),
            tokens_used: TokenUsage { input: 10, output: 5 },
            complexity: Some(Complexity::Simple),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let state = make_state(1, Step::Plan);
        write_iteration_state(dir.path(), &state).await.unwrap();
        let read = read_iteration_state(dir.path(), 1, Step::Plan).await.unwrap();
        assert_eq!(read, Some(state));
    }

    #[tokio::test]
    async fn read_missing_returns_none() {
        let dir = tempdir().unwrap();
        let read = read_iteration_state(dir.path(), 99, Step::Plan).await.unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn last_completed_step_empty_dir_returns_none() {
        let dir = tempdir().unwrap();
        assert_eq!(last_completed_step(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_completed_step_picks_highest_iteration() {
        let dir = tempdir().unwrap();
        write_iteration_state(dir.path(), &make_state(1, Step::Reflect)).await.unwrap();
        write_iteration_state(dir.path(), &make_state(3, Step::Plan)).await.unwrap();
        write_iteration_state(dir.path(), &make_state(2, Step::Reflect)).await.unwrap();
        assert_eq!(last_completed_step(dir.path()).await.unwrap(), Some((3, Step::Plan)));
    }

    #[tokio::test]
    async fn last_completed_step_breaks_ties_by_step_order() {
        let dir = tempdir().unwrap();
        write_iteration_state(dir.path(), &make_state(1, Step::Plan)).await.unwrap();
        write_iteration_state(dir.path(), &make_state(1, Step::Execute)).await.unwrap();
        assert_eq!(last_completed_step(dir.path()).await.unwrap(), Some((1, Step::Execute)));
    }

    #[tokio::test]
    async fn overwrite_does_not_mutate_other_steps() {
        let dir = tempdir().unwrap();
        write_iteration_state(dir.path(), &make_state(1, Step::Plan)).await.unwrap();
        write_iteration_state(dir.path(), &make_state(1, Step::Reflect)).await.unwrap();
        // Writing reflect must not touch the plan file.
        let plan = read_iteration_state(dir.path(), 1, Step::Plan).await.unwrap();
        assert!(plan.is_some());
    }

    #[test]
    fn parse_iteration_filename_rejects_malformed() {
        assert_eq!(parse_iteration_filename("garbage.json"), None);
        assert_eq!(parse_iteration_filename("iteration-abc-plan.json"), None);
        assert_eq!(parse_iteration_filename("iteration-1-bogus.json"), None);
    }

    #[test]
    fn parse_iteration_filename_accepts_plan_execute_hyphen() {
        assert_eq!(
            parse_iteration_filename("iteration-7-plan-execute.json"),
            Some((7, Step::PlanExecute))
        );
    }
}
