// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentCounters, AgentState};
use crate::answer::AnswerKey;
use crate::ids::{AgentId, AnonymizedId};

/// Where the turn is in the Orchestrator's phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Exploration,
    Convergence,
    Presentation,
}

/// Per-agent projection of `AgentRecord` exposed on the Status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub anonymized_id: AnonymizedId,
    pub state: AgentState,
    pub counters: AgentCounters,
    pub restarts_used: u32,
}

/// Turn-wide running totals. Monotonic for the lifetime of the turn; a
/// restart does not zero these, only the restarted agent's own counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostAggregate {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub estimated_cost_usd: f64,
}

/// The atomically-written, externally-readable snapshot of one turn's
/// progress. Written via write-temp/fsync/rename so a reader never
/// observes a partial document (see `massgen-orchestrator`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnStatus {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Restart attempt number for the turn as a whole, starting at 1.
    pub attempt: u32,
    /// Resets to 0 at the start of each attempt; accumulates across
    /// answers/votes within that attempt.
    pub completion_percentage: f32,
    pub agents: HashMap<AgentId, AgentStatus>,
    pub winner: Option<AnswerKey>,
    /// The winning answer's text, inlined so a parent orchestrator (or a
    /// timed-out caller reading this document as a recovery source) never
    /// has to resolve `winner` against a snapshot it may not have access
    /// to.
    pub winner_text: Option<String>,
    pub cost: CostAggregate,
    pub subagent_refs: Vec<String>,
}

impl TurnStatus {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Exploration,
            started_at,
            updated_at: started_at,
            attempt: 1,
            completion_percentage: 0.0,
            agents: HashMap::new(),
            winner: None,
            winner_text: None,
            cost: CostAggregate::default(),
            subagent_refs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_status_starts_in_exploration_with_zero_progress() {
        let status = TurnStatus::new(Utc::now());
        assert_eq!(status.phase, Phase::Exploration);
        assert_eq!(status.attempt, 1);
        assert_eq!(status.completion_percentage, 0.0);
        assert!(status.winner.is_none());
    }
}
