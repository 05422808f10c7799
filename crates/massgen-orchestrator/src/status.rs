// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use massgen_types::TurnStatus;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Writes the turn-wide Status document to a well-known path, atomically
/// (write-temp/rename) and on a fixed cadence plus every state transition.
pub struct StatusWriter {
    path: PathBuf,
    heartbeat_interval: Duration,
}

impl StatusWriter {
    pub fn new(path: impl Into<PathBuf>, heartbeat_interval: Duration) -> Self {
        Self {
            path: path.into(),
            heartbeat_interval,
        }
    }

    /// Serialize `status` and rename it into place so a concurrent reader
    /// never observes a partially-written document.
    #[instrument(skip(self, status), fields(path = %self.path.display()))]
    pub async fn write(&self, status: &TurnStatus) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(status).context("serializing turn status")?;
        let path = self.path.clone();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating status directory {}", dir.display()))?;
            let mut temp = tempfile::NamedTempFile::new_in(&dir)
                .context("creating temp file for status document")?;
            use std::io::Write;
            temp.write_all(&json).context("writing status document")?;
            temp.as_file().sync_all().context("fsyncing status document")?;
            temp.persist(&path)
                .map_err(|e| e.error)
                .with_context(|| format!("renaming status document into {}", path.display()))?;
            Ok(())
        })
        .await
        .context("status writer task panicked")??;

        debug!("status document written");
        Ok(())
    }

    /// Spawn a background task that re-writes the live `status` on a fixed
    /// interval, independent of state-transition-triggered writes. The
    /// returned handle should be aborted once the turn ends.
    pub fn spawn_heartbeat(
        self: Arc<Self>,
        status: Arc<RwLock<TurnStatus>>,
    ) -> tokio::task::JoinHandle<()> {
        let interval = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = status.read().await.clone();
                if let Err(err) = self.write(&snapshot).await {
                    tracing::warn!(error = %err, "heartbeat status write failed");
                }
            }
        })
    }
}

/// Each submitted answer contributes `50/N`, each vote contributes `50/N`,
/// clamped to `[0, 100]`.
pub fn completion_percentage(num_agents: usize, answers: usize, votes: usize) -> f32 {
    if num_agents == 0 {
        return 0.0;
    }
    let per_unit = 50.0 / num_agents as f32;
    ((answers + votes) as f32 * per_unit).clamp(0.0, 100.0)
}
