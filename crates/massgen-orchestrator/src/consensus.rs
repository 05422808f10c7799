// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use massgen_types::{AgentId, AnonymizedId, AnswerKey, Vote};

/// A minimal view of an accepted answer, enough to break a vote tie.
#[derive(Debug, Clone, Copy)]
pub struct AnswerRef {
    pub key: AnswerKey,
    pub timestamp: DateTime<Utc>,
}

/// Count votes per target and return the current plurality leader, if any.
/// Ties are broken by earliest answer timestamp, then lowest anonymized id
/// — deterministic, per the boundary behavior documented for a two-way
/// vote tie.
pub fn plurality_winner(
    votes: &[Vote],
    answers: &[AnswerRef],
    anonymized_ids: &HashMap<AgentId, AnonymizedId>,
) -> Option<AnswerKey> {
    if answers.is_empty() {
        return None;
    }

    let mut counts: HashMap<AnswerKey, u32> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.target).or_insert(0) += 1;
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    let mut candidates: Vec<&AnswerRef> = if max_count == 0 {
        answers.iter().collect()
    } else {
        answers
            .iter()
            .filter(|a| counts.get(&a.key).copied().unwrap_or(0) == max_count)
            .collect()
    };

    candidates.sort_by(|a, b| {
        a.timestamp.cmp(&b.timestamp).then_with(|| {
            let anon_a = anonymized_ids.get(&a.key.agent_id).map(|a| a.0.as_str()).unwrap_or("");
            let anon_b = anonymized_ids.get(&b.key.agent_id).map(|a| a.0.as_str()).unwrap_or("");
            anon_a.cmp(anon_b)
        })
    });

    candidates.first().map(|a| a.key)
}

/// True if the current plurality leader holds a strict majority of the
/// votes cast so far — used by the first consensus predicate.
pub fn has_strict_plurality(votes: &[Vote], total_agents: usize) -> bool {
    if votes.is_empty() || total_agents == 0 {
        return false;
    }
    let mut counts: HashMap<AnswerKey, u32> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.target).or_insert(0) += 1;
    }
    let max_count = counts.values().copied().max().unwrap_or(0);
    let runner_up = counts
        .values()
        .copied()
        .filter(|&c| c != max_count)
        .max()
        .unwrap_or(0);
    max_count > runner_up && (max_count as usize) * 2 > total_agents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(agent_id: AgentId, version: u32, timestamp: DateTime<Utc>) -> AnswerRef {
        AnswerRef {
            key: AnswerKey { agent_id, version },
            timestamp,
        }
    }

    fn vote(voter_id: AgentId, target: AnswerKey) -> Vote {
        Vote {
            voter_id,
            target,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn single_vote_determines_winner() {
        let a = AgentId::new();
        let b = AgentId::new();
        let answers = vec![answer(a, 1, Utc::now()), answer(b, 1, Utc::now())];
        let votes = vec![vote(a, AnswerKey { agent_id: b, version: 1 })];
        let ids = HashMap::new();
        let winner = plurality_winner(&votes, &answers, &ids);
        assert_eq!(winner, Some(AnswerKey { agent_id: b, version: 1 }));
    }

    #[test]
    fn tie_breaks_on_earliest_answer_timestamp() {
        let a = AgentId::new();
        let b = AgentId::new();
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(5);
        let answers = vec![answer(a, 1, earlier), answer(b, 1, later)];
        // No votes at all -> tie among all answers, broken by timestamp.
        let ids = HashMap::new();
        let winner = plurality_winner(&[], &answers, &ids);
        assert_eq!(winner, Some(AnswerKey { agent_id: a, version: 1 }));
    }

    #[test]
    fn tie_on_timestamp_breaks_on_anonymized_id() {
        let a = AgentId::new();
        let b = AgentId::new();
        let same_time = Utc::now();
        let answers = vec![answer(a, 1, same_time), answer(b, 1, same_time)];
        let mut ids = HashMap::new();
        ids.insert(a, AnonymizedId("agent2".into()));
        ids.insert(b, AnonymizedId("agent1".into()));
        let winner = plurality_winner(&[], &answers, &ids);
        assert_eq!(winner, Some(AnswerKey { agent_id: b, version: 1 }));
    }

    #[test]
    fn no_answers_means_no_winner() {
        assert_eq!(plurality_winner(&[], &[], &HashMap::new()), None);
    }

    #[test]
    fn strict_plurality_requires_a_majority_of_voters() {
        let a = AgentId::new();
        let b = AgentId::new();
        let target_b = AnswerKey { agent_id: b, version: 1 };
        let votes = vec![vote(a, target_b), vote(b, target_b)];
        assert!(has_strict_plurality(&votes, 2));
        assert!(!has_strict_plurality(&votes, 5));
    }
}
