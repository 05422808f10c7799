// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wires [`SubagentGateway`] into the Orchestrator's
//! [`massgen_orchestrator::SubagentDispatcher`] seam, so the root binary
//! can hand the orchestrator a real subprocess-backed dispatcher instead
//! of [`massgen_orchestrator::NoSubagents`].

use async_trait::async_trait;
use massgen_orchestrator::SubagentDispatcher;
use massgen_types::{AgentId, CostAggregate};
use tracing::warn;

use crate::request::SubagentRequest;
use crate::spawn::SubagentGateway;

#[async_trait]
impl SubagentDispatcher for SubagentGateway {
    async fn dispatch(
        &self,
        agent_id: AgentId,
        tasks: Vec<String>,
    ) -> anyhow::Result<(Vec<String>, CostAggregate)> {
        let requests: Vec<SubagentRequest> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| SubagentRequest::new(format!("{agent_id}-{index}"), task))
            .collect();

        let (outcomes, cost) = self.spawn_subagents(requests).await?;
        tracing::info!(
            agent = %agent_id,
            tokens_in = cost.tokens_in,
            tokens_out = cost.tokens_out,
            "subagent batch complete"
        );

        let refs = outcomes
            .into_iter()
            .map(|outcome| {
                if !outcome.success {
                    warn!(subagent_id = %outcome.subagent_id, kind = ?outcome.kind, "subagent returned without a usable answer");
                }
                outcome.subagent_id
            })
            .collect();
        Ok((refs, cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use massgen_config::SubagentConfig;

    #[tokio::test]
    async fn dispatch_rejects_when_batch_exceeds_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noop.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let mut config = SubagentConfig::default();
        config.max_concurrency = 1;
        let gateway = SubagentGateway::new(config, 0, dir.path(), script);

        let agent_id = AgentId::new();
        let result = gateway
            .dispatch(agent_id, vec!["a".into(), "b".into()])
            .await;
        assert!(result.is_err());
    }
}
