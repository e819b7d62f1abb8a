// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod create_tool;
pub mod fs;
pub mod git;
pub mod send;
pub mod shell;
pub mod spawn;
pub mod web_fetch;
pub mod web_search;

pub use create_tool::CreateToolTool;
pub use fs::{EditFileTool, GlobTool, GrepTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use git::GitTool;
pub use send::SendTool;
pub use shell::ShellTool;
pub use spawn::SpawnTool;
pub use web_fetch::WebFetchTool;
