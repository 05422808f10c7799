// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use massgen_types::{AnonymizedId, AnswerKey};

/// What kind of peer event an injectable item reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Answer,
    Vote,
}

/// One piece of peer content a recipient agent has not yet seen,
/// attributed only to an anonymized source so the recipient never learns
/// a real `AgentId`.
#[derive(Debug, Clone)]
pub struct InjectableItem {
    pub source_anon_id: AnonymizedId,
    pub kind: ItemKind,
    pub key: AnswerKey,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
