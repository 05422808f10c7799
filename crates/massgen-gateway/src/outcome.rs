// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use massgen_types::CostAggregate;
use serde::{Deserialize, Serialize};

/// What the gateway synthesized for one child after its timeout window
/// closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentOutcomeKind {
    /// The child process exited on its own, before its timeout elapsed.
    Completed,
    /// The timeout fired, but the child's Status document already
    /// recorded a full answer by the time the gateway read it.
    CompletedButTimeout,
    /// The timeout fired; the child made progress (answers or votes
    /// recorded) but never reached a winner.
    Partial,
    /// The timeout fired and the child's Status document shows no
    /// recoverable work at all.
    Timeout,
    /// The child process exited with an error, or its Status document
    /// could not be read/parsed.
    Error,
}

/// The gateway's per-child result, handed back to the parent Orchestrator
/// to fold into its own answer set and cost aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentOutcome {
    pub subagent_id: String,
    pub kind: SubagentOutcomeKind,
    pub success: bool,
    pub answer: Option<String>,
    pub cost: CostAggregate,
}

impl SubagentOutcome {
    pub fn error(subagent_id: &str, reason: impl AsRef<str>) -> Self {
        tracing::warn!(subagent_id, reason = %reason.as_ref(), "subagent produced no usable result");
        Self {
            subagent_id: subagent_id.to_string(),
            kind: SubagentOutcomeKind::Error,
            success: false,
            answer: None,
            cost: CostAggregate::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_outcome_is_never_a_success() {
        let outcome = SubagentOutcome::error("sub0", "boom");
        assert_eq!(outcome.kind, SubagentOutcomeKind::Error);
        assert!(!outcome.success);
        assert!(outcome.answer.is_none());
    }
}
