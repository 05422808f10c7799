// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::answer::AnswerKey;
use crate::ids::{AgentId, AnonymizedId};

/// Where an agent sits in the turn lifecycle. Transitions are driven
/// exclusively by the Orchestrator's coordinator lock; an Agent Runtime
/// reports events, it never flips its own record's state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Working,
    Answered,
    Voting,
    Completed,
    Failed,
}

/// Running counters the Status Aggregator surfaces per agent. Every field
/// is monotonic within an attempt; a restart resets them for the new
/// attempt (see `AgentRecord::restarts_used`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCounters {
    pub new_answers_emitted: u32,
    pub tools_used: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub estimated_cost_usd: f64,
    /// Deltas coalesced rather than dropped under backpressure.
    pub coalesced_deltas: u32,
}

/// The Orchestrator's bookkeeping record for one agent across a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub anonymized_id: AnonymizedId,
    pub state: AgentState,
    pub counters: AgentCounters,
    /// Answer/vote pairs this agent has already been shown, so the
    /// Injection Engine never delivers the same content twice.
    pub visibility: HashSet<AnswerKey>,
    /// Restarts consumed so far this turn; bounded by
    /// `TurnConfig::max_restarts_per_agent`.
    pub restarts_used: u32,
    /// Whether this agent's one free "no injection yet" slot has already
    /// been spent. The first injection a recipient would otherwise
    /// receive in a turn is suppressed so it has a chance to form its own
    /// approach first; this flips to `true` the moment that slot is
    /// consumed, whether or not content was actually new.
    pub spent_first_injection_grace: bool,
}

impl AgentRecord {
    pub fn new(agent_id: AgentId, anonymized_id: AnonymizedId) -> Self {
        Self {
            agent_id,
            anonymized_id,
            state: AgentState::Idle,
            counters: AgentCounters::default(),
            visibility: HashSet::new(),
            restarts_used: 0,
            spent_first_injection_grace: false,
        }
    }

    pub fn has_seen(&self, key: &AnswerKey) -> bool {
        self.visibility.contains(key)
    }

    pub fn mark_seen(&mut self, key: AnswerKey) {
        self.visibility.insert(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_starts_idle_with_no_visibility() {
        let record = AgentRecord::new(AgentId::new(), AnonymizedId::for_index(0));
        assert_eq!(record.state, AgentState::Idle);
        assert_eq!(record.counters.new_answers_emitted, 0);
        assert!(record.visibility.is_empty());
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let mut record = AgentRecord::new(AgentId::new(), AnonymizedId::for_index(1));
        let key = AnswerKey {
            agent_id: AgentId::new(),
            version: 1,
        };
        assert!(!record.has_seen(&key));
        record.mark_seen(key.clone());
        record.mark_seen(key.clone());
        assert!(record.has_seen(&key));
    }
}
