// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use massgen_types::AnonymizedId;

/// The minimal coordination-role system prompt every agent starts a turn
/// with. Unlike a general coding-agent prompt, this one carries no tool
/// catalog beyond the three coordination tools — an agent's actual work
/// tools are whatever its backend exposes outside this runtime.
pub fn coordination_system_prompt(anonymized_id: &AnonymizedId, peer_count: usize) -> String {
    format!(
        "You are {anonymized_id}, one of {total} agents working on the same \
         task. You will see other agents' published answers and votes as \
         they arrive, attributed only to their anonymized id — never a real \
         identity.\n\n\
         Use `new_answer` to publish your current best answer; you may call \
         it again to revise. Use `vote` to endorse another agent's answer \
         once you believe it should win — you cannot vote for your own \
         answer. Use `spawn_subagents` if a part of the task can be split \
         into independent, bounded investigations.\n\n\
         The turn ends once enough agents converge on one answer by vote, \
         or the round times out.",
        total = peer_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_the_agents_own_anonymized_id() {
        let prompt = coordination_system_prompt(&AnonymizedId("agent3".into()), 4);
        assert!(prompt.contains("agent3"));
        assert!(prompt.contains("4 agents"));
    }
}
