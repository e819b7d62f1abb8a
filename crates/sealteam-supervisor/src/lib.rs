// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session supervisor: workspace bootstrap, leader spawn, the monitor loop,
//! and graceful shutdown. See [`Supervisor`] for the entry point the
//! `sealteam` binary drives.

mod options;
mod process;
mod supervisor;

pub use options::SupervisorOptions;
pub use process::{leader_config, pid_is_alive, spawn_agent, LEADER_NAME, MAIN_ADDRESS};
pub use supervisor::Supervisor;
