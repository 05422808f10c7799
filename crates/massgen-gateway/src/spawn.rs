// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use massgen_config::SubagentConfig;
use massgen_types::{CostAggregate, TurnStatus};
use tokio::process::{Child, Command};
use tracing::{info, instrument, warn};

use crate::outcome::{SubagentOutcome, SubagentOutcomeKind};
use crate::request::SubagentRequest;

/// A child orchestrator process spawned for one subagent task, not yet
/// awaited. Returned by [`SubagentGateway::spawn_async`].
pub struct SubagentHandle {
    subagent_id: String,
    child: Child,
    status_path: PathBuf,
    timeout: Duration,
}

impl SubagentHandle {
    /// Block on this one child until it exits or its timeout elapses,
    /// then classify the outcome from its Status document.
    #[instrument(skip(self), fields(subagent_id = %self.subagent_id))]
    pub async fn join(mut self) -> SubagentOutcome {
        match tokio::time::timeout(self.timeout, self.child.wait()).await {
            Ok(Ok(exit)) if exit.success() => {
                classify(&self.subagent_id, &self.status_path, true).await
            }
            Ok(Ok(exit)) => {
                warn!(code = ?exit.code(), "subagent process exited with a failure status");
                SubagentOutcome::error(&self.subagent_id, "non-zero exit status")
            }
            Ok(Err(err)) => SubagentOutcome::error(&self.subagent_id, err.to_string()),
            Err(_) => {
                warn!("subagent timed out, killing and reading its status document");
                let _ = self.child.start_kill();
                classify(&self.subagent_id, &self.status_path, false).await
            }
        }
    }

    pub fn subagent_id(&self) -> &str {
        &self.subagent_id
    }
}

/// Read the child's Status document and synthesize one of the five
/// outcome kinds a subagent run can end in.
async fn classify(subagent_id: &str, status_path: &Path, exited_naturally: bool) -> SubagentOutcome {
    let bytes = match tokio::fs::read(status_path).await {
        Ok(b) => b,
        Err(_) if exited_naturally => {
            // Process exited cleanly but never wrote a status document —
            // treat as a (costless) completion with no recovered answer.
            return SubagentOutcome {
                subagent_id: subagent_id.to_string(),
                kind: SubagentOutcomeKind::Completed,
                success: false,
                answer: None,
                cost: CostAggregate::default(),
            };
        }
        Err(err) => return SubagentOutcome::error(subagent_id, format!("no status document: {err}")),
    };

    let status: TurnStatus = match serde_json::from_slice(&bytes) {
        Ok(s) => s,
        Err(err) => return SubagentOutcome::error(subagent_id, format!("malformed status document: {err}")),
    };

    let has_winner = status.winner.is_some() && status.winner_text.is_some();
    let made_progress = !status.agents.is_empty() && status.completion_percentage > 0.0;

    let kind = if exited_naturally {
        SubagentOutcomeKind::Completed
    } else if has_winner {
        SubagentOutcomeKind::CompletedButTimeout
    } else if made_progress {
        SubagentOutcomeKind::Partial
    } else {
        SubagentOutcomeKind::Timeout
    };

    SubagentOutcome {
        subagent_id: subagent_id.to_string(),
        kind,
        success: has_winner,
        answer: status.winner_text,
        cost: status.cost,
    }
}

/// Validates, prepares, and spawns child orchestrator processes for a
/// parent's `spawn_subagents` call, then (by default) blocks for all of
/// them to finish.
pub struct SubagentGateway {
    config: SubagentConfig,
    /// Nesting depth of the orchestrator making *this* gateway call: 0 for
    /// a top-level turn, 1 for a turn running inside a subagent, etc.
    depth: u32,
    /// Root directory under which `subagents/<subagent_id>/` trees are
    /// created, matching the turn's persisted state layout.
    log_root: PathBuf,
    /// Executable spawned for each child — in production this is the
    /// `massgen` binary re-invoked in subagent mode; tests point it at a
    /// fixture script instead.
    child_command: PathBuf,
}

impl SubagentGateway {
    pub fn new(config: SubagentConfig, depth: u32, log_root: impl Into<PathBuf>, child_command: impl Into<PathBuf>) -> Self {
        Self {
            config,
            depth,
            log_root: log_root.into(),
            child_command: child_command.into(),
        }
    }

    fn validate(&self, requests: &[SubagentRequest]) -> anyhow::Result<()> {
        if self.depth >= self.config.max_depth {
            bail!(
                "nested sub-spawning rejected: depth {} has reached max_depth {}",
                self.depth,
                self.config.max_depth
            );
        }
        if requests.is_empty() {
            bail!("spawn_subagents requires at least one task");
        }
        if requests.len() as u32 > self.config.max_concurrency {
            bail!(
                "spawn_subagents requested {} tasks, exceeding max_concurrency {}",
                requests.len(),
                self.config.max_concurrency
            );
        }
        Ok(())
    }

    /// Create `<log_root>/subagents/<subagent_id>/` and mirror every
    /// context file into it read-only.
    async fn prepare_directory(&self, request: &SubagentRequest) -> anyhow::Result<PathBuf> {
        let dir = self.log_root.join("subagents").join(&request.subagent_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating subagent directory {}", dir.display()))?;

        if !request.context_files.is_empty() {
            let context_dir = dir.join("context");
            tokio::fs::create_dir_all(&context_dir).await?;
            for file in &request.context_files {
                let Some(name) = file.file_name() else {
                    continue;
                };
                let dest = context_dir.join(name);
                tokio::fs::copy(file, &dest)
                    .await
                    .with_context(|| format!("mirroring context file {}", file.display()))?;
                let mut perms = tokio::fs::metadata(&dest).await?.permissions();
                perms.set_readonly(true);
                tokio::fs::set_permissions(&dest, perms).await?;
            }
        }
        Ok(dir)
    }

    fn spawn_child(&self, request: &SubagentRequest, dir: &Path) -> anyhow::Result<(Child, PathBuf)> {
        let status_path = dir.join("status.json");
        let mut cmd = Command::new(&self.child_command);
        cmd.arg("--subagent")
            .arg("--task")
            .arg(&request.task)
            .arg("--status-path")
            .arg(&status_path)
            .arg("--depth")
            .arg((self.depth + 1).to_string())
            .arg("--workdir")
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if request.refine {
            cmd.arg("--refine");
        }
        let child = cmd
            .spawn()
            .with_context(|| format!("spawning subagent process for {}", request.subagent_id))?;
        Ok((child, status_path))
    }

    /// Spawn every request and return handles immediately without
    /// awaiting completion (the gateway's async mode).
    #[instrument(skip(self, requests))]
    pub async fn spawn_async(&self, requests: Vec<SubagentRequest>) -> anyhow::Result<Vec<SubagentHandle>> {
        self.validate(&requests)?;
        let clamped_timeout = Duration::from_secs(self.config.clamp_timeout(self.config.timeout_secs));

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let dir = self.prepare_directory(&request).await?;
            let (child, status_path) = self.spawn_child(&request, &dir)?;
            info!(subagent_id = %request.subagent_id, "subagent spawned");
            handles.push(SubagentHandle {
                subagent_id: request.subagent_id,
                child,
                status_path,
                timeout: clamped_timeout,
            });
        }
        Ok(handles)
    }

    /// Spawn every request and block until all children have either
    /// completed or timed out, returning one outcome per request and the
    /// costs already folded together for convenience.
    #[instrument(skip(self, requests))]
    pub async fn spawn_subagents(
        &self,
        requests: Vec<SubagentRequest>,
    ) -> anyhow::Result<(Vec<SubagentOutcome>, CostAggregate)> {
        let handles = self.spawn_async(requests).await?;
        let mut outcomes = Vec::with_capacity(handles.len());
        let mut joins = Vec::with_capacity(handles.len());
        for handle in handles {
            joins.push(tokio::spawn(handle.join()));
        }
        for join in joins {
            match join.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => outcomes.push(SubagentOutcome::error("unknown", err.to_string())),
            }
        }

        let mut aggregate = CostAggregate::default();
        for outcome in &outcomes {
            aggregate.tokens_in += outcome.cost.tokens_in;
            aggregate.tokens_out += outcome.cost.tokens_out;
            aggregate.estimated_cost_usd += outcome.cost.estimated_cost_usd;
        }
        Ok((outcomes, aggregate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> SubagentConfig {
        SubagentConfig {
            max_depth: 3,
            max_concurrency: 4,
            timeout_secs: 5,
            min_timeout_secs: 1,
            max_timeout_secs: 60,
        }
    }

    /// A tiny shell-less "child" binary stand-in: a shell script invoked
    /// via `sh` that writes a status document matching what the real
    /// `massgen` binary's subagent mode would produce, then exits 0.
    fn fixture_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake_subagent.sh");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh\n{body}").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn rejects_more_tasks_than_max_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let script = fixture_script(dir.path(), "exit 0");
        let gateway = SubagentGateway::new(config(), 0, dir.path(), script);
        let requests: Vec<_> = (0..10)
            .map(|i| SubagentRequest::new(format!("sub{i}"), "task"))
            .collect();
        let result = gateway.spawn_subagents(requests).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_when_depth_reaches_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let script = fixture_script(dir.path(), "exit 0");
        let mut cfg = config();
        cfg.max_depth = 1;
        let gateway = SubagentGateway::new(cfg, 1, dir.path(), script);
        let result = gateway
            .spawn_subagents(vec![SubagentRequest::new("sub0", "task")])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_empty_request_list() {
        let dir = tempfile::tempdir().unwrap();
        let script = fixture_script(dir.path(), "exit 0");
        let gateway = SubagentGateway::new(config(), 0, dir.path(), script);
        assert!(gateway.spawn_subagents(vec![]).await.is_err());
    }

    #[tokio::test]
    async fn normal_completion_reads_status_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        // The fixture script writes a status document with a winner to
        // whatever path the gateway passed it, then exits cleanly.
        let script = fixture_script(
            dir.path(),
            r#"
STATUS_PATH=""
while [ $# -gt 0 ]; do
  case "$1" in
    --status-path) STATUS_PATH="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat > "$STATUS_PATH" <<'EOF'
{"phase":"presentation","started_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z","attempt":1,"completion_percentage":100.0,"agents":{},"winner":{"agent_id":"00000000-0000-0000-0000-000000000000","version":1},"winner_text":"forty two","cost":{"tokens_in":10,"tokens_out":20,"estimated_cost_usd":0.01},"subagent_refs":[]}
EOF
exit 0
"#,
        );
        let gateway = SubagentGateway::new(config(), 0, dir.path(), script);
        let (outcomes, cost) = gateway
            .spawn_subagents(vec![SubagentRequest::new("sub0", "what is the answer")])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].kind, SubagentOutcomeKind::Completed);
        assert_eq!(outcomes[0].answer.as_deref(), Some("forty two"));
        assert_eq!(cost.tokens_in, 10);
        assert_eq!(cost.tokens_out, 20);
    }

    #[tokio::test]
    async fn timeout_with_no_status_document_is_classified_as_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = fixture_script(dir.path(), "sleep 30");
        let mut cfg = config();
        cfg.timeout_secs = 1;
        cfg.min_timeout_secs = 1;
        let gateway = SubagentGateway::new(cfg, 0, dir.path(), script);
        let (outcomes, _cost) = gateway
            .spawn_subagents(vec![SubagentRequest::new("sub0", "slow task")])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].kind, SubagentOutcomeKind::Timeout);
        assert!(!outcomes[0].success);
    }

    #[tokio::test]
    async fn context_files_are_mirrored_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let context_src = dir.path().join("notes.txt");
        std::fs::write(&context_src, "background notes").unwrap();
        let script = fixture_script(dir.path(), "exit 0");
        let gateway = SubagentGateway::new(config(), 0, dir.path(), script);
        let request = SubagentRequest::new("sub0", "task").with_context_files(vec![context_src]);
        let _ = gateway.spawn_subagents(vec![request]).await.unwrap();

        let mirrored = dir.path().join("subagents/sub0/context/notes.txt");
        assert!(mirrored.exists());
        let meta = std::fs::metadata(&mirrored).unwrap();
        assert!(meta.permissions().readonly());
    }
}
