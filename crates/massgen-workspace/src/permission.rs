// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use massgen_types::{AgentId, PermissionEntry, PermissionLevel};
use tokio::sync::RwLock;

/// Tracks path-prefix permissions per agent. Reads take a shared lock and
/// never block on a write in progress longer than the write itself —
/// there is no per-check I/O, so contention stays negligible even with
/// many agents checking concurrently.
#[derive(Default)]
pub struct PermissionManager {
    per_agent: RwLock<HashMap<AgentId, Vec<PermissionEntry>>>,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `level` access to `path` and everything under it for the
    /// duration of the turn. If an entry for the same path already exists
    /// at a lower level, use `upgrade` instead — this always appends.
    pub async fn add_turn_context_path(
        &self,
        agent_id: AgentId,
        path: impl Into<PathBuf>,
        level: PermissionLevel,
    ) {
        let mut guard = self.per_agent.write().await;
        guard.entry(agent_id).or_default().push(PermissionEntry {
            path: path.into(),
            level,
        });
    }

    /// Replace a `Read` entry for `path` with `Write`, or add a fresh
    /// `Write` entry if none covers it yet.
    pub async fn upgrade(&self, agent_id: AgentId, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut guard = self.per_agent.write().await;
        let entries = guard.entry(agent_id).or_default();
        if let Some(entry) = entries.iter_mut().find(|e| e.path == path) {
            entry.level = PermissionLevel::Write;
        } else {
            entries.push(PermissionEntry {
                path,
                level: PermissionLevel::Write,
            });
        }
    }

    /// True if some granted entry covers `path` at `level` or above.
    pub async fn check(&self, agent_id: AgentId, path: &Path, level: PermissionLevel) -> bool {
        let guard = self.per_agent.read().await;
        let Some(entries) = guard.get(&agent_id) else {
            return false;
        };
        entries
            .iter()
            .any(|entry| path.starts_with(&entry.path) && entry.level >= level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_agent_has_no_access() {
        let manager = PermissionManager::new();
        let allowed = manager
            .check(AgentId::new(), Path::new("/tmp/x"), PermissionLevel::Read)
            .await;
        assert!(!allowed);
    }

    #[tokio::test]
    async fn grants_cover_nested_paths() {
        let manager = PermissionManager::new();
        let agent = AgentId::new();
        manager
            .add_turn_context_path(agent, "/work/agent1", PermissionLevel::Read)
            .await;
        assert!(
            manager
                .check(agent, Path::new("/work/agent1/notes.md"), PermissionLevel::Read)
                .await
        );
        assert!(
            !manager
                .check(agent, Path::new("/work/agent2/notes.md"), PermissionLevel::Read)
                .await
        );
    }

    #[tokio::test]
    async fn read_grant_does_not_satisfy_write_check() {
        let manager = PermissionManager::new();
        let agent = AgentId::new();
        manager
            .add_turn_context_path(agent, "/work/agent1", PermissionLevel::Read)
            .await;
        assert!(
            !manager
                .check(agent, Path::new("/work/agent1/notes.md"), PermissionLevel::Write)
                .await
        );
    }

    #[tokio::test]
    async fn upgrade_replaces_read_with_write_in_place() {
        let manager = PermissionManager::new();
        let agent = AgentId::new();
        manager
            .add_turn_context_path(agent, "/work/agent1", PermissionLevel::Read)
            .await;
        manager.upgrade(agent, "/work/agent1").await;

        assert!(
            manager
                .check(agent, Path::new("/work/agent1/notes.md"), PermissionLevel::Write)
                .await
        );
        let guard = manager.per_agent.read().await;
        assert_eq!(guard.get(&agent).unwrap().len(), 1);
    }
}
