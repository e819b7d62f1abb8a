// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The narrow boundary between an agent's life loop and an LLM backend.
//!
//! Everything upstream of [`infer_with_retry`] only depends on the
//! [`LlmClient`] trait; concrete wire formats live behind [`AnthropicClient`]
//! and [`MockLlmClient`].
mod anthropic;
mod catalog;
mod client;
mod mock;
mod types;

pub use anthropic::AnthropicClient;
pub use catalog::{context_window_for, static_catalog, InputModality, ModelCatalogEntry};
pub use client::{infer_with_retry, LlmClient, LlmError};
pub use mock::MockLlmClient;
pub use types::*;
