// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;
use crate::workspace::SnapshotRef;

/// Identifies one immutable answer: the agent that produced it and its
/// version number (monotonically increasing per agent, starting at 1).
/// Used as the key into an agent's visibility set and as a vote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnswerKey {
    pub agent_id: AgentId,
    pub version: u32,
}

/// An agent's proposed final answer at a point in time. Once published an
/// `Answer` is never mutated; a revision is a new `Answer` with an
/// incremented `version` and supersedes the previous one as a vote target,
/// but does not retroactively invalidate votes already cast for the prior
/// version; superseding a version does not rescind its novelty credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub agent_id: AgentId,
    pub version: u32,
    pub text: String,
    /// Reference to the workspace snapshot taken at publish time, if the
    /// agent's workspace had file changes worth preserving.
    pub workspace_snapshot_ref: Option<SnapshotRef>,
    pub timestamp: DateTime<Utc>,
    /// Normalized token set used by the novelty check; stored alongside
    /// the answer so a later novelty comparison never has to re-tokenize.
    pub token_overlap_fingerprint: HashSet<String>,
}

impl Answer {
    pub fn key(&self) -> AnswerKey {
        AnswerKey {
            agent_id: self.agent_id,
            version: self.version,
        }
    }
}
