// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Future;
use massgen_types::{
    AgentId, EventType, HandlerRef, HookEvent, HookRegistration, HookResult, HookScope,
    InjectPayload, ToolDecision, TurnId,
};
use tracing::{debug, instrument};

use crate::external::run_external_hook;
use crate::matcher::matches;

pub type InProcessHandler =
    Arc<dyn Fn(HookEvent) -> Pin<Box<dyn Future<Output = HookResult> + Send>> + Send + Sync>;

/// The result of running every matching hook against one event, in
/// registration order, short-circuiting on the first `Deny`.
#[derive(Debug, Default)]
pub struct HookOutcome {
    pub decision: ToolDecision,
    pub reason: Option<String>,
    /// The tool input after every matched hook has had a chance to
    /// rewrite it, applied in registration order.
    pub updated_input: Option<serde_json::Value>,
    pub injects: Vec<InjectPayload>,
}

impl HookOutcome {
    fn allow() -> Self {
        Self {
            decision: ToolDecision::Allow,
            ..Default::default()
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.decision, ToolDecision::Allow)
    }
}

/// Registers hooks and runs them against tool-call events: glob matching
/// against the tool name, ordered execution, deny-short-circuit, and
/// inject-payload aggregation for the Injection Engine to consume.
pub struct HookManager {
    registrations: Vec<HookRegistration>,
    in_process: HashMap<String, InProcessHandler>,
    default_timeout: Duration,
}

impl HookManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registrations: Vec::new(),
            in_process: HashMap::new(),
            default_timeout,
        }
    }

    pub fn register(&mut self, registration: HookRegistration) {
        self.registrations.push(registration);
    }

    /// Bind a name referenced by `HandlerRef::InProcess` to an actual
    /// callable. Must be called before `run` observes a registration using
    /// that name.
    pub fn register_in_process(&mut self, name: impl Into<String>, handler: InProcessHandler) {
        self.in_process.insert(name.into(), handler);
    }

    #[instrument(skip(self, event), fields(tool = %event.tool_name))]
    pub async fn run(&self, agent_id: AgentId, event_type: EventType, mut event: HookEvent) -> HookOutcome {
        let mut outcome = HookOutcome::allow();

        // A per-agent registration for this event/agent with `override_global`
        // set drops every global registration for that event type, so only
        // this agent's own hooks run.
        let agent_overrides = self.registrations.iter().any(|r| {
            r.event_type == event_type
                && r.override_global
                && matches!(&r.scope, HookScope::Agent(id) if *id == agent_id)
        });

        for registration in &self.registrations {
            if registration.event_type != event_type {
                continue;
            }
            if agent_overrides && registration.scope == HookScope::Global {
                continue;
            }
            if !scope_applies(&registration.scope, agent_id) {
                continue;
            }
            if !matches(&registration.matcher, &event.tool_name) {
                continue;
            }

            if let Some(input) = &outcome.updated_input {
                event.tool_input = input.clone();
            }

            let result = self.invoke(registration, &event).await;

            if let Some(updated) = result.updated_input.clone() {
                outcome.updated_input = Some(updated);
            }
            if let Some(inject) = result.inject.clone() {
                outcome.injects.push(inject);
            }
            if matches!(result.decision, ToolDecision::Deny) {
                debug!(reason = ?result.reason, "hook denied tool call");
                outcome.decision = ToolDecision::Deny;
                outcome.reason = result.reason;
                return outcome;
            }
            if matches!(result.decision, ToolDecision::Ask) {
                outcome.decision = ToolDecision::Ask;
                outcome.reason = result.reason.clone();
            }
        }

        outcome
    }

    async fn invoke(&self, registration: &HookRegistration, event: &HookEvent) -> HookResult {
        match &registration.handler {
            HandlerRef::InProcess(name) => match self.in_process.get(name) {
                Some(handler) => handler(event.clone()).await,
                None => {
                    // An unresolvable handler name is a configuration bug,
                    // not a runtime failure — always deny regardless of
                    // `fail_closed`.
                    debug!(name, "no in-process handler bound for this name");
                    HookResult::deny(format!("unbound in-process hook '{name}'"))
                }
            },
            HandlerRef::ExternalCommand(path) => {
                run_external_hook(path, event, self.default_timeout, registration.fail_closed)
                    .await
            }
        }
    }
}

fn scope_applies(scope: &HookScope, agent_id: AgentId) -> bool {
    match scope {
        HookScope::Global => true,
        HookScope::Agent(id) => *id == agent_id,
    }
}
