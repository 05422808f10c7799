// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::AnswerKey;
use crate::ids::AgentId;

/// One agent's vote for a published answer. Self-votes and votes for a
/// non-existent target are rejected before a `Vote` is ever constructed
/// (see `massgen-orchestrator`'s acceptance checks) — by the time a `Vote`
/// exists it is known valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: AgentId,
    pub target: AnswerKey,
    pub timestamp: DateTime<Utc>,
}

impl Vote {
    pub fn is_self_vote(&self) -> bool {
        self.voter_id == self.target.agent_id
    }
}
