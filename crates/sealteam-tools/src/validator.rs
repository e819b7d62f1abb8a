// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

const DISALLOWED_SUBSTRINGS: &[&str] = &["eval(", "new Function("];
const IMPORT_WHITELIST: &[&str] = &["path", "url", "crypto", "buffer", "runtime", "test-harness"];
const NODE_OUTPUT_CAP_CHARS: usize = 2_000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolRegistryStatus {
    Pending,
    Active,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRegistryEntry {
    pub name: String,
    pub path: PathBuf,
    pub status: ToolRegistryStatus,
    pub validated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// `definition.description`/`definition.input_schema` read back from
    /// the module at validation time, so an `Active` entry can be turned
    /// into a callable tool without reloading the module just to ask it
    /// what its own schema is.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    #[serde(default)]
    entries: Vec<ToolRegistryEntry>,
}

fn registry_path(workspace: &Path) -> PathBuf {
    workspace.join("tools").join("registry.json")
}

async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), ValidationError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn load_registry(workspace: &Path) -> Result<Registry, ValidationError> {
    let path = registry_path(workspace);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Registry::default()),
        Err(e) => Err(e.into()),
    }
}

async fn save_registry(workspace: &Path, registry: &Registry) -> Result<(), ValidationError> {
    let contents = serde_json::to_vec_pretty(registry)?;
    atomic_write(&registry_path(workspace), &contents).await
}

/// Security scan of dynamic tool source: disallow `eval`/`new Function`
/// and process-env access other than `ANTHROPIC_API_KEY`; only whitelisted
/// bare imports are accepted.
fn security_scan(source: &str) -> Result<(), String> {
    for needle in DISALLOWED_SUBSTRINGS {
        if source.contains(needle) {
            return Err(format!("disallowed construct: {needle}"));
        }
    }
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("process.env.") {
            let var = rest.split(|c: char| !c.is_ascii_alphanumeric() && c != '_').next().unwrap_or("");
            if var != "ANTHROPIC_API_KEY" {
                return Err(format!("disallowed environment access: process.env.{var}"));
            }
        }
        if let Some(rest) = trimmed.strip_prefix("import ") {
            if let Some(from_idx) = rest.find("from ") {
                let module = rest[from_idx + 5..].trim().trim_matches(|c| c == '\'' || c == '"' || c == ';');
                let is_relative = module.starts_with('.') || module.starts_with('/');
                let is_whitelisted = IMPORT_WHITELIST.contains(&module);
                if !is_relative && !is_whitelisted {
                    return Err(format!("disallowed import: {module}"));
                }
            }
        }
    }
    Ok(())
}

/// Run the companion `<name>.test.ts` file in isolation via a Node/Deno
/// class runtime, capturing bounded output the same way `shell.rs` captures
/// and truncates subprocess output.
async fn run_test_file(workspace: &Path, test_rel_path: &Path) -> Result<(), String> {
    let mut cmd = Command::new("node");
    cmd.arg(test_rel_path);
    cmd.current_dir(workspace);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    let output = cmd.output().await.map_err(|e| format!("spawning test runner: {e}"))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let truncated: String = stderr.chars().take(NODE_OUTPUT_CAP_CHARS).collect();
        Err(format!("test run failed (exit {:?}): {truncated}", output.status.code()))
    }
}

/// Metadata read back off the module's `definition` export.
struct ToolSchemaMeta {
    description: String,
    input_schema: serde_json::Value,
}

/// Actually import the tool's module in a Node subprocess and inspect its
/// exported shape, instead of pattern-matching the source text: the module
/// must export both `definition` and `handler`, `definition.name`/
/// `definition.description` must be non-empty strings, `definition.
/// input_schema` must be an object, and `handler` must be a function. On
/// success prints the schema fields as JSON on stdout so the caller can
/// cache them without a second load.
async fn check_schema(workspace: &Path, tool_rel_path: &Path) -> Result<ToolSchemaMeta, String> {
    let probe = format!(
        "import('./tools/{}').then(m => {{ \
             const def = m.definition, handler = m.handler; \
             if (def === undefined || handler === undefined) throw new Error(\"source must export both 'definition' and 'handler'\"); \
             if (typeof def !== 'object' || def === null) throw new Error('definition must be an object'); \
             if (typeof def.name !== 'string' || def.name.length === 0) throw new Error('definition.name must be a non-empty string'); \
             if (typeof def.description !== 'string' || def.description.length === 0) throw new Error('definition.description must be a non-empty string'); \
             if (typeof def.input_schema !== 'object' || def.input_schema === null) throw new Error('definition.input_schema must be an object'); \
             if (typeof handler !== 'function') throw new Error('handler must be a function'); \
             console.log(JSON.stringify({{description: def.description, input_schema: def.input_schema}})); \
         }}).catch(e => {{ console.error(e.message); process.exit(1); }});",
        tool_rel_path.display()
    );
    let mut cmd = Command::new("node");
    cmd.arg("--input-type=module").arg("-e").arg(&probe);
    cmd.current_dir(workspace);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    let output = cmd.output().await.map_err(|e| format!("spawning schema check: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let truncated: String = stderr.chars().take(NODE_OUTPUT_CAP_CHARS).collect();
        return Err(truncated);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|e| format!("schema check produced unparseable output: {e}"))?;
    Ok(ToolSchemaMeta {
        description: parsed.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        input_schema: parsed.get("input_schema").cloned().unwrap_or_else(|| json_object()),
    })
}

fn json_object() -> serde_json::Value {
    serde_json::json!({})
}

/// Import-and-schema, security-scan, then test-coverage pipeline for one
/// dynamic tool. `tool_path` is the relative path of the tool's source
/// under `tools/`. Always returns `Ok` with the resulting registry entry
/// (Active or Disabled); `Err` only for I/O failures reading/writing the
/// registry itself.
pub async fn validate_tool(
    workspace: &Path,
    name: &str,
    tool_path: &Path,
) -> Result<ToolRegistryEntry, ValidationError> {
    let mut registry = load_registry(workspace).await?;

    let abs_source_path = workspace.join("tools").join(tool_path);
    let source = tokio::fs::read_to_string(&abs_source_path).await?;

    let schema_check = check_schema(workspace, tool_path).await;
    let outcome = match schema_check {
        Ok(meta) => security_scan(&source).map(|()| meta),
        Err(e) => Err(e),
    };

    let test_path = tool_path.with_extension("test.ts");
    let outcome = match outcome {
        Ok(meta) => {
            let abs_test_path = workspace.join("tools").join(&test_path);
            if !abs_test_path.exists() {
                Err(format!("missing test companion: {}", test_path.display()))
            } else {
                run_test_file(workspace, &test_path).await.map(|()| meta)
            }
        }
        Err(e) => Err(e),
    };

    let entry = match outcome {
        Ok(meta) => {
            info!(tool = name, "dynamic tool validated, now active");
            ToolRegistryEntry {
                name: name.to_string(),
                path: tool_path.to_path_buf(),
                status: ToolRegistryStatus::Active,
                validated_at: Some(Utc::now()),
                error: None,
                description: Some(meta.description),
                input_schema: Some(meta.input_schema),
            }
        }
        Err(e) => {
            warn!(tool = name, error = %e, "dynamic tool failed validation, disabled");
            ToolRegistryEntry {
                name: name.to_string(),
                path: tool_path.to_path_buf(),
                status: ToolRegistryStatus::Disabled,
                validated_at: Some(Utc::now()),
                error: Some(e),
                description: None,
                input_schema: None,
            }
        }
    };

    registry.entries.retain(|e| e.name != name);
    registry.entries.push(entry.clone());
    save_registry(workspace, &registry).await?;

    Ok(entry)
}

/// Reread `tools/registry.json` and return every `Active` entry. Called by
/// the agent bootstrap to rebuild the dynamic-tool set at process start.
pub async fn scan_dynamic(workspace: &Path) -> Result<Vec<ToolRegistryEntry>, ValidationError> {
    let registry = load_registry(workspace).await?;
    Ok(registry.entries.into_iter().filter(|e| e.status == ToolRegistryStatus::Active).collect())
}

/// A validated dynamic tool, callable like any built-in: `execute` shells
/// out to Node and invokes the module's `handler` with the call's args.
pub struct DynamicTool {
    workspace: PathBuf,
    name: String,
    description: String,
    input_schema: serde_json::Value,
    tool_rel_path: PathBuf,
}

impl DynamicTool {
    /// Build a callable tool from a registry entry that is `Active` and has
    /// cached schema metadata; returns `None` otherwise (e.g. an entry
    /// written by an older validator run before these fields existed).
    pub fn from_entry(workspace: &Path, entry: &ToolRegistryEntry) -> Option<Self> {
        if entry.status != ToolRegistryStatus::Active {
            return None;
        }
        Some(Self {
            workspace: workspace.to_path_buf(),
            name: entry.name.clone(),
            description: entry.description.clone()?,
            input_schema: entry.input_schema.clone()?,
            tool_rel_path: entry.path.clone(),
        })
    }
}

#[async_trait]
impl Tool for DynamicTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn parameters_schema(&self) -> serde_json::Value {
        self.input_schema.clone()
    }
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args_json = call.args.to_string();
        let probe = format!(
            "import('./tools/{}').then(m => m.handler(JSON.parse(process.argv[1]))).then(r => {{ \
                 console.log(typeof r === 'string' ? r : JSON.stringify(r)); \
             }}).catch(e => {{ console.error(e.message); process.exit(1); }});",
            self.tool_rel_path.display()
        );
        let mut cmd = Command::new("node");
        cmd.arg("--input-type=module").arg("-e").arg(&probe).arg(&args_json);
        cmd.current_dir(&self.workspace);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) => return ToolOutput::err(&call.id, format!("spawning dynamic tool '{}': {e}", self.name)),
        };
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            ToolOutput::ok(&call.id, stdout.trim_end())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let truncated: String = stderr.chars().take(NODE_OUTPUT_CAP_CHARS).collect();
            ToolOutput::err(&call.id, format!("dynamic tool '{}' failed: {truncated}", self.name))
        }
    }
}
