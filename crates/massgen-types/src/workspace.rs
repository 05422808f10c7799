// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// Read or write access to a path prefix inside an agent's workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Write,
}

/// A single granted permission: `path` and everything under it is
/// accessible at `level`. `PermissionManager::upgrade` replaces a
/// `Read` entry with `Write` for the same path rather than appending a
/// second entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub path: PathBuf,
    pub level: PermissionLevel,
}

/// The live, on-disk working directory assigned to one agent for the
/// duration of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub agent_id: AgentId,
    pub root_path: PathBuf,
    pub permissions: Vec<PermissionEntry>,
}

impl WorkspaceRecord {
    pub fn new(agent_id: AgentId, root_path: PathBuf) -> Self {
        Self {
            agent_id,
            root_path,
            permissions: Vec::new(),
        }
    }
}

/// Opaque handle to a point-in-time copy of an agent's workspace, taken
/// when that agent publishes an answer. Stored by value inside `Answer`
/// so the snapshot a vote resolves to is never ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotRef(pub String);

/// A point-in-time, read-only copy of an agent's workspace on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_ref: SnapshotRef,
    pub agent_id: AgentId,
    pub answer_version: u32,
    pub timestamp: DateTime<Utc>,
    pub storage_path: PathBuf,
    pub file_inventory: Vec<PathBuf>,
}

/// A read-only mirror of one agent's snapshot exposed into another
/// agent's workspace so it can inspect a peer's files without being able
/// to mutate them. Anonymized: the recipient only ever sees
/// `anonymized_source_id`, never the real `AgentId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempWorkspace {
    pub recipient_id: AgentId,
    pub anonymized_source_id: String,
    pub mirror_of: SnapshotRef,
    pub mirror_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_workspace_has_no_permissions() {
        let record = WorkspaceRecord::new(AgentId::new(), PathBuf::from("/tmp/w"));
        assert!(record.permissions.is_empty());
    }

    #[test]
    fn permission_levels_order_read_below_write() {
        assert!(PermissionLevel::Read < PermissionLevel::Write);
    }
}
