// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

/// One task handed to `spawn_subagents`, prepared into its own
/// subdirectory before the child process is spawned.
#[derive(Debug, Clone)]
pub struct SubagentRequest {
    pub subagent_id: String,
    pub task: String,
    /// Paths copied read-only into the child's directory before spawn.
    pub context_files: Vec<PathBuf>,
    /// Re-run the same task with the prior child's answer as additional
    /// context, rather than starting fresh.
    pub refine: bool,
}

impl SubagentRequest {
    pub fn new(subagent_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            subagent_id: subagent_id.into(),
            task: task.into(),
            context_files: Vec::new(),
            refine: false,
        }
    }

    pub fn with_context_files(mut self, files: Vec<PathBuf>) -> Self {
        self.context_files = files;
        self
    }

    pub fn with_refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }
}
