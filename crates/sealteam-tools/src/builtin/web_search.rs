// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::json;

use crate::registry::ToolSchema;

/// Descriptor for the server-hosted `web_search` tool: only the schema is
/// advertised to the model; the provider executes the search itself, so
/// there is no local [`crate::Tool`] impl to register.
pub fn definition() -> ToolSchema {
    ToolSchema {
        name: "web_search".to_string(),
        description: "Search the web and return a list of relevant results.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_has_expected_name() {
        assert_eq!(definition().name, "web_search");
    }
}
