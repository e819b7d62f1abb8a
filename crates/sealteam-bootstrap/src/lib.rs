// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agent construction factory: turns a session [`sealteam_config::Config`]
//! and one agent's [`sealteam_config::AgentConfig`] into a runnable
//! [`sealteam_core::LifeLoop`].

pub mod agent;

pub use agent::AgentBuilder;
