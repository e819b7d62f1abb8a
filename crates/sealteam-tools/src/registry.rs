// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use sealteam_config::AgentRole;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema handed to the model, independent of any model-crate type.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Host for every tool available to an agent process: built-ins plus
/// whatever dynamic tools [`crate::dynamic::scan_dynamic`] has loaded as
/// `Active`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    server_hosted: Vec<ToolSchema>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new(), server_hosted: Vec::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register a server-hosted tool: the host only advertises its schema,
    /// since execution happens provider-side.
    pub fn register_server_hosted(&mut self, schema: ToolSchema) {
        self.server_hosted.push(schema);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_server_tool(&self, name: &str) -> bool {
        self.server_hosted.iter().any(|s| s.name == name)
    }

    /// Local tool schemas available to `role` and named in `allowed`.
    pub fn local_tool_defs(&self, role: AgentRole, allowed: &[String]) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| t.roles().contains(&role) && allowed.iter().any(|a| a == t.name()))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn server_tool_specs(&self, allowed: &[String]) -> Vec<ToolSchema> {
        self.server_hosted
            .iter()
            .filter(|s| allowed.iter().any(|a| a == &s.name))
            .cloned()
            .collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::policy::ApprovalPolicy;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn default_policy(&self) -> ApprovalPolicy {
            ApprovalPolicy::Auto
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn local_tool_defs_filters_by_allowed_list() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "a" });
        reg.register(EchoTool { name: "b" });
        let schemas = reg.local_tool_defs(AgentRole::Worker, &["a".to_string()]);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "a");
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo" });
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call).await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call).await;
        assert!(out.is_error);
    }

    #[test]
    fn server_hosted_tool_is_not_local() {
        let mut reg = ToolRegistry::new();
        reg.register_server_hosted(ToolSchema {
            name: "web_search".into(),
            description: "search the web".into(),
            parameters: json!({"type":"object"}),
        });
        assert!(reg.is_server_tool("web_search"));
        assert!(reg.get("web_search").is_none());
    }
}
