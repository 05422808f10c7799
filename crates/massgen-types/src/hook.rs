// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentId, TurnId};

/// The two points in a tool call a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PreToolUse,
    PostToolUse,
}

/// Which agents a registration applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookScope {
    Global,
    Agent(AgentId),
}

/// What a registration actually invokes. A closed set rather than a
/// trait object: an in-process handler is looked up by name in the Hook
/// Manager's own registry, an external-command handler is a subprocess
/// path. Neither variant can carry un-serializable state, which keeps
/// `HookRegistration` itself plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerRef {
    InProcess(String),
    ExternalCommand(PathBuf),
}

/// A hook registered against one event type and glob matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRegistration {
    pub event_type: EventType,
    /// Glob pattern matched against the tool name (e.g. `"fs_write*"`).
    pub matcher: String,
    pub handler: HandlerRef,
    pub scope: HookScope,
    /// If true, a hook timeout or crash denies the tool call instead of
    /// allowing it through.
    pub fail_closed: bool,
    /// If true and this is a per-agent registration, global registrations
    /// for the same event type are dropped entirely for that agent — only
    /// this agent's own registrations run. Ignored on a `Global` scope.
    pub override_global: bool,
}

/// The payload delivered to a hook when its matcher fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub event_type: EventType,
    /// The turn this event belongs to, carried through for log
    /// correlation across hook invocations from different agents.
    pub session_id: TurnId,
    pub agent_id: AgentId,
    pub tool_name: String,
    pub tool_input: Value,
    /// Present only for `PostToolUse`.
    pub tool_output: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// A hook's decision about whether the tool call it observed may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolDecision {
    #[default]
    Allow,
    Deny,
    Ask,
}

/// Where injected content should be delivered in the target agent's
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectStrategy {
    ToolResult,
    UserMessage,
}

/// Content a hook asks the Injection Engine to deliver, piggybacked on
/// its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectPayload {
    pub content: String,
    pub strategy: InjectStrategy,
}

/// What came back from running one hook against one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResult {
    pub decision: ToolDecision,
    pub reason: Option<String>,
    /// A `PreToolUse` hook may rewrite the tool's input before dispatch.
    pub updated_input: Option<Value>,
    pub inject: Option<InjectPayload>,
}

impl HookResult {
    pub fn allow() -> Self {
        Self {
            decision: ToolDecision::Allow,
            reason: None,
            updated_input: None,
            inject: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: ToolDecision::Deny,
            reason: Some(reason.into()),
            updated_input: None,
            inject: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, ToolDecision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_has_no_reason() {
        let result = HookResult::allow();
        assert!(result.is_allowed());
        assert!(result.reason.is_none());
    }

    #[test]
    fn deny_carries_a_reason() {
        let result = HookResult::deny("path outside workspace");
        assert!(!result.is_allowed());
        assert_eq!(result.reason.as_deref(), Some("path outside workspace"));
    }
}
