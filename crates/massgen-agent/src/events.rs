// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::tool::CoordinationAction;

/// Events emitted by an Agent Runtime during a single turn. The
/// Orchestrator subscribes to these to drive answer/vote acceptance and
/// the Status Aggregator.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the backend.
    TextDelta(String),
    /// The backend requested a coordination tool call.
    ToolCallStarted { call_id: String, action: CoordinationAction },
    /// A coordination tool call finished and its result was pushed back
    /// into the session.
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        accepted: bool,
        reason: Option<String>,
    },
    /// Token accounting for the completed round.
    TokenUsage {
        input: u64,
        output: u64,
        cache_read: u64,
        cache_write: u64,
    },
    /// The runtime exhausted its tool-round budget or the backend stopped
    /// calling tools; the turn is over.
    TurnComplete,
    /// The turn was cancelled; any text already streamed was committed to
    /// the session before this event was sent.
    Aborted { partial_text: String },
    /// A recoverable error occurred.
    Error(String),
}
