// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use massgen_types::{AgentRecord, AnswerKey, CoreError, Vote};

use crate::novelty::NoveltyMetric;

/// Reject a candidate answer against the agent's remaining answer budget
/// and the novelty check, in that order — cheaper check first.
pub fn validate_answer(
    agent: &AgentRecord,
    max_new_answers_per_agent: u32,
    metric: &dyn NoveltyMetric,
    candidate_tokens: &HashSet<String>,
    existing_tokens: &[HashSet<String>],
    novelty_threshold: f32,
) -> Result<(), CoreError> {
    if agent.counters.new_answers_emitted >= max_new_answers_per_agent {
        return Err(CoreError::AnswerCapExceeded(agent.agent_id));
    }
    if !metric.is_novel(candidate_tokens, existing_tokens, novelty_threshold) {
        return Err(CoreError::NoveltyReject);
    }
    Ok(())
}

/// Reject a self-vote or a vote targeting an answer that does not exist
/// yet.
pub fn validate_vote(vote: &Vote, existing_answer_keys: &HashSet<AnswerKey>) -> Result<(), CoreError> {
    if vote.is_self_vote() {
        return Err(CoreError::SelfVote(vote.voter_id));
    }
    if !existing_answer_keys.contains(&vote.target) {
        return Err(CoreError::InvalidVoteTarget(vote.target));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novelty::{tokenize, TokenOverlapMetric};
    use chrono::Utc;
    use massgen_types::{AgentId, AnonymizedId};

    #[test]
    fn answer_cap_rejects_once_budget_is_spent() {
        let mut agent = AgentRecord::new(AgentId::new(), AnonymizedId::for_index(0));
        agent.counters.new_answers_emitted = 3;
        let result = validate_answer(
            &agent,
            3,
            &TokenOverlapMetric,
            &tokenize("brand new text"),
            &[],
            0.70,
        );
        assert!(matches!(result, Err(CoreError::AnswerCapExceeded(_))));
    }

    #[test]
    fn near_duplicate_answer_is_rejected_as_non_novel() {
        let agent = AgentRecord::new(AgentId::new(), AnonymizedId::for_index(0));
        let existing = vec![tokenize("the sky is blue today")];
        let result = validate_answer(
            &agent,
            3,
            &TokenOverlapMetric,
            &tokenize("the sky is blue today"),
            &existing,
            0.70,
        );
        assert!(matches!(result, Err(CoreError::NoveltyReject)));
    }

    #[test]
    fn distinct_answer_within_budget_is_accepted() {
        let agent = AgentRecord::new(AgentId::new(), AnonymizedId::for_index(0));
        let existing = vec![tokenize("the sky is blue today")];
        let result = validate_answer(
            &agent,
            3,
            &TokenOverlapMetric,
            &tokenize("rust is a systems language"),
            &existing,
            0.70,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn self_vote_is_rejected() {
        let agent_id = AgentId::new();
        let vote = Vote {
            voter_id: agent_id,
            target: AnswerKey {
                agent_id,
                version: 1,
            },
            timestamp: Utc::now(),
        };
        let result = validate_vote(&vote, &HashSet::new());
        assert!(matches!(result, Err(CoreError::SelfVote(_))));
    }

    #[test]
    fn vote_for_unknown_target_is_rejected() {
        let vote = Vote {
            voter_id: AgentId::new(),
            target: AnswerKey {
                agent_id: AgentId::new(),
                version: 1,
            },
            timestamp: Utc::now(),
        };
        let result = validate_vote(&vote, &HashSet::new());
        assert!(matches!(result, Err(CoreError::InvalidVoteTarget(_))));
    }

    #[test]
    fn vote_for_known_target_is_accepted() {
        let target_agent = AgentId::new();
        let key = AnswerKey {
            agent_id: target_agent,
            version: 1,
        };
        let vote = Vote {
            voter_id: AgentId::new(),
            target: key,
            timestamp: Utc::now(),
        };
        let mut known = HashSet::new();
        known.insert(key);
        assert!(validate_vote(&vote, &known).is_ok());
    }
}
