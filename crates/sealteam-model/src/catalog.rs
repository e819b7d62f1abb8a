// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Static metadata for known models: context window and max output tokens,
//! used by the context compactor's per-model budget lookup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputModality {
    Text,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelCatalogEntry {
    pub id: String,
    pub provider: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
}

/// Bundled catalog. Kept small and explicit rather than loaded from an
/// external file since this crate has no file-distribution mechanism of its
/// own; new models are added here directly.
pub fn static_catalog() -> Vec<ModelCatalogEntry> {
    vec![
        ModelCatalogEntry {
            id: "claude-sonnet-4-5".into(),
            provider: "anthropic".into(),
            context_window: 200_000,
            max_output_tokens: 8_192,
        },
        ModelCatalogEntry {
            id: "claude-haiku-4-5".into(),
            provider: "anthropic".into(),
            context_window: 200_000,
            max_output_tokens: 8_192,
        },
        ModelCatalogEntry {
            id: "gpt-4o".into(),
            provider: "openai".into(),
            context_window: 128_000,
            max_output_tokens: 16_384,
        },
        ModelCatalogEntry {
            id: "gpt-4o-mini".into(),
            provider: "openai".into(),
            context_window: 128_000,
            max_output_tokens: 16_384,
        },
        ModelCatalogEntry {
            id: "mock-model".into(),
            provider: "mock".into(),
            context_window: 200_000,
            max_output_tokens: 8_192,
        },
    ]
}

/// Look up a model's context window, falling back to the 200k default used
/// throughout the context compactor when the model is unrecognized.
pub fn context_window_for(model: &str) -> u32 {
    static_catalog()
        .into_iter()
        .find(|e| e.id == model)
        .map(|e| e.context_window)
        .unwrap_or(200_000)
}
