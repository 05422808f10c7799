// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use massgen_types::{AgentId, Snapshot, SnapshotRef, TempWorkspace, WorkspaceRecord};
use tracing::debug;
use walkdir::WalkDir;

/// Owns the on-disk layout for all agent workspaces, snapshots, and
/// cross-agent temp-workspace mirrors within one turn.
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create (or reuse) the live working directory for one agent.
    pub async fn ensure_workspace(&self, agent_id: AgentId) -> anyhow::Result<WorkspaceRecord> {
        let path = self.root.join("agents").join(agent_id.to_string());
        tokio::fs::create_dir_all(&path)
            .await
            .with_context(|| format!("creating workspace dir {}", path.display()))?;
        Ok(WorkspaceRecord::new(agent_id, path))
    }

    /// Take a point-in-time, read-only copy of `workspace` for the given
    /// answer version. Returns `CoreError::SnapshotBusy`-shaped errors (via
    /// `anyhow`) if a snapshot for this exact version already exists —
    /// callers retry with backoff rather than treating it as fatal.
    pub async fn snapshot(
        &self,
        workspace: &WorkspaceRecord,
        answer_version: u32,
    ) -> anyhow::Result<Snapshot> {
        let snapshot_ref = SnapshotRef(format!("{}-{}", workspace.agent_id, answer_version));
        let storage_path = self.root.join("snapshots").join(&snapshot_ref.0);

        match tokio::fs::create_dir(&storage_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!("snapshot busy: {} already exists", storage_path.display());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("creating snapshot dir {}", storage_path.display())
                })
            }
        }

        let mut file_inventory = Vec::new();
        for entry in WalkDir::new(&workspace.root_path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let relative = entry
                .path()
                .strip_prefix(&workspace.root_path)
                .unwrap_or(entry.path());
            let dest = storage_path.join(relative);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("creating snapshot subdirectory {}", parent.display())
                })?;
            }
            tokio::fs::copy(entry.path(), &dest)
                .await
                .with_context(|| format!("copying {} into snapshot", entry.path().display()))?;
            file_inventory.push(relative.to_path_buf());
        }

        debug!(
            agent_id = %workspace.agent_id,
            answer_version,
            files = file_inventory.len(),
            "workspace snapshot taken"
        );

        Ok(Snapshot {
            snapshot_ref,
            agent_id: workspace.agent_id,
            answer_version,
            timestamp: Utc::now(),
            storage_path,
            file_inventory,
        })
    }

    /// Mirror `snapshot` read-only into `recipient_id`'s view, under an
    /// anonymized source label so the recipient cannot learn the real
    /// source agent's identity from the path alone.
    pub async fn expose(
        &self,
        snapshot: &Snapshot,
        recipient_id: AgentId,
        anonymized_source_id: impl Into<String>,
    ) -> anyhow::Result<TempWorkspace> {
        let anonymized_source_id = anonymized_source_id.into();
        let mirror_path = self
            .root
            .join("temp")
            .join(recipient_id.to_string())
            .join(&anonymized_source_id);

        tokio::fs::create_dir_all(&mirror_path)
            .await
            .with_context(|| format!("creating temp workspace {}", mirror_path.display()))?;

        for relative in &snapshot.file_inventory {
            let src = snapshot.storage_path.join(relative);
            let dest = mirror_path.join(relative);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&src, &dest)
                .await
                .with_context(|| format!("mirroring {} into temp workspace", src.display()))?;
        }

        Ok(TempWorkspace {
            recipient_id,
            anonymized_source_id,
            mirror_of: snapshot.snapshot_ref.clone(),
            mirror_path,
        })
    }

    /// Rewrite occurrences of real workspace paths in `text` with their
    /// anonymized labels, so content crossing the Injection Engine boundary
    /// never leaks a real `AgentId` or filesystem layout.
    pub fn rewrite_paths(&self, text: &str, real_to_anon: &HashMap<PathBuf, String>) -> String {
        let mut rewritten = text.to_string();
        for (real, anon) in real_to_anon {
            if let Some(real_str) = real.to_str() {
                rewritten = rewritten.replace(real_str, anon);
            }
        }
        rewritten
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
