// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use crate::answer::AnswerKey;
use crate::ids::AgentId;

/// The closed set of error kinds callers across the workspace match on.
/// Each variant names the *kind* of failure, not the message — a
/// `.context(..)` string carries the human-readable detail at the
/// `anyhow` call site that wraps one of these.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend call failed (retryable): {0}")]
    BackendTransient(String),

    #[error("backend call failed (fatal): {0}")]
    BackendFatal(String),

    #[error("tool execution failed: {0}")]
    Tool(String),

    #[error("hook execution failed: {0}")]
    Hook(String),

    #[error("answer rejected: below novelty threshold")]
    NoveltyReject,

    #[error("vote rejected: agent {0} voted for its own answer")]
    SelfVote(AgentId),

    #[error("vote rejected: target {0:?} does not exist")]
    InvalidVoteTarget(AnswerKey),

    #[error("answer rejected: agent {0} exceeded its per-turn answer cap")]
    AnswerCapExceeded(AgentId),

    #[error("snapshot busy, retry")]
    SnapshotBusy,

    #[error("round timed out")]
    RoundTimeout,

    #[error("agent {0} was cancelled")]
    AgentCancelled(AgentId),
}
