// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use futures::StreamExt;
use massgen_backend::{BackendSession, CompletionRequest, Message, ResponseEvent};
use massgen_hooks::HookManager;
use massgen_types::{AgentId, EventType, HookEvent, InjectStrategy, TurnId};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, instrument, warn};

use crate::events::AgentEvent;
use crate::session::Session;
use crate::tool::{coordination_tool_schemas, parse_tool_call, ToolCall};

/// A shared cell the Orchestrator reads from to recover an agent's
/// conversation history across a restart.
/// Updated at the top of every round, so the recovered history never
/// misses more than the in-flight round.
pub type ConversationCheckpoint = Arc<Mutex<Vec<Message>>>;

/// Drives one `BackendSession` through one turn: streams completions,
/// applies hooks around every coordination tool call, and reports
/// progress over an event channel.
pub struct AgentRuntime {
    agent_id: AgentId,
    turn_id: TurnId,
    backend: Arc<dyn BackendSession>,
    hooks: Arc<HookManager>,
    session: Session,
    max_rounds: u32,
    checkpoint: Option<ConversationCheckpoint>,
}

impl AgentRuntime {
    pub fn new(
        agent_id: AgentId,
        turn_id: TurnId,
        backend: Arc<dyn BackendSession>,
        hooks: Arc<HookManager>,
        max_tokens: usize,
        max_rounds: u32,
        system_prompt: impl Into<String>,
    ) -> Self {
        let mut session = Session::new(max_tokens);
        session.push(Message::system(system_prompt));
        Self {
            agent_id,
            turn_id,
            backend,
            hooks,
            session,
            max_rounds,
            checkpoint: None,
        }
    }

    /// Publish this runtime's message history into `checkpoint` at the
    /// start of every round, so a caller holding the other end can rebuild
    /// an equivalent runtime (restart) without replaying the backend.
    pub fn with_checkpoint(mut self, checkpoint: ConversationCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Deliver injected peer content into this agent's running session,
    /// using the strategy the Injection Engine selected.
    pub fn inject(&mut self, content: String, strategy: InjectStrategy) {
        let message = match strategy {
            InjectStrategy::ToolResult => Message::tool_result("injection", content),
            InjectStrategy::UserMessage => Message::user(content),
        };
        self.session.push(message);
    }

    #[instrument(skip(self, tx, cancel, inject_rx), fields(agent_id = %self.agent_id))]
    pub async fn run_turn(
        &mut self,
        tx: mpsc::Sender<AgentEvent>,
        mut cancel: oneshot::Receiver<()>,
        mut inject_rx: mpsc::Receiver<(String, InjectStrategy)>,
    ) -> anyhow::Result<()> {
        let mut rounds = 0u32;
        let mut partial_text = String::new();

        loop {
            if let Ok(()) | Err(oneshot::error::TryRecvError::Closed) = cancel.try_recv() {
                self.commit_partial(&mut partial_text);
                let _ = tx.send(AgentEvent::Aborted { partial_text }).await;
                return Ok(());
            }

            while let Ok((content, strategy)) = inject_rx.try_recv() {
                self.inject(content, strategy);
            }

            if let Some(checkpoint) = &self.checkpoint {
                *checkpoint.lock().await = self.session.messages.clone();
            }

            rounds += 1;
            if rounds > self.max_rounds {
                let _ = tx.send(AgentEvent::TurnComplete).await;
                return Ok(());
            }

            let request = CompletionRequest {
                messages: self.session.messages.clone(),
                tools: coordination_tool_schemas(),
                stream: true,
            };

            let stream = tokio::select! {
                biased;
                _ = &mut cancel => {
                    self.commit_partial(&mut partial_text);
                    let _ = tx.send(AgentEvent::Aborted { partial_text }).await;
                    return Ok(());
                }
                result = self.backend.complete(request) => result?,
            };

            let (text, tool_calls, had_tool_calls) =
                self.drain_stream(stream, &tx).await?;

            if !text.is_empty() {
                partial_text.push_str(&text);
                self.session.push(Message::assistant(&text));
            }

            for call in &tool_calls {
                self.dispatch_tool_call(call, &tx).await;
            }

            if !had_tool_calls {
                let _ = tx.send(AgentEvent::TurnComplete).await;
                return Ok(());
            }
        }
    }

    fn commit_partial(&mut self, partial_text: &mut String) {
        if !partial_text.is_empty() {
            self.session.push(Message::assistant(partial_text.as_str()));
        }
    }

    async fn drain_stream(
        &mut self,
        mut stream: massgen_backend::ResponseStream,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<(String, Vec<ToolCall>, bool)> {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut had_tool_calls = false;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ResponseEvent::TextDelta(delta)) => {
                    text.push_str(&delta);
                    let _ = tx.send(AgentEvent::TextDelta(delta)).await;
                }
                Ok(ResponseEvent::ToolCall {
                    id,
                    name,
                    arguments,
                }) => {
                    had_tool_calls = true;
                    let arguments: serde_json::Value =
                        serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null);
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments,
                    });
                }
                Ok(ResponseEvent::Usage {
                    input_tokens,
                    output_tokens,
                    cache_read_tokens,
                    cache_write_tokens,
                }) => {
                    let _ = tx
                        .send(AgentEvent::TokenUsage {
                            input: input_tokens,
                            output: output_tokens,
                            cache_read: cache_read_tokens,
                            cache_write: cache_write_tokens,
                        })
                        .await;
                }
                Ok(ResponseEvent::Done) => break,
                Err(err) => {
                    warn!(error = %err, "backend stream error");
                    let _ = tx.send(AgentEvent::Error(err.to_string())).await;
                    return Err(err);
                }
            }
        }

        Ok((text, tool_calls, had_tool_calls))
    }

    async fn dispatch_tool_call(&mut self, call: &ToolCall, tx: &mpsc::Sender<AgentEvent>) {
        let pre_event = HookEvent {
            event_type: EventType::PreToolUse,
            session_id: self.turn_id,
            agent_id: self.agent_id,
            tool_name: call.name.clone(),
            tool_input: call.arguments.clone(),
            tool_output: None,
            timestamp: chrono::Utc::now(),
        };
        let pre_outcome = self
            .hooks
            .run(self.agent_id, EventType::PreToolUse, pre_event)
            .await;

        if !pre_outcome.is_allowed() {
            let reason = pre_outcome
                .reason
                .unwrap_or_else(|| "denied by hook".to_string());
            self.session
                .push(Message::tool_result(&call.id, format!("denied: {reason}")));
            let _ = tx
                .send(AgentEvent::ToolCallFinished {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    accepted: false,
                    reason: Some(reason),
                })
                .await;
            return;
        }

        let input = pre_outcome.updated_input.unwrap_or_else(|| call.arguments.clone());
        let effective_call = ToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: input,
        };

        match parse_tool_call(&effective_call) {
            Ok(action) => {
                debug!(?action, "coordination action parsed");
                self.session
                    .push(Message::tool_result(&call.id, "accepted"));
                let _ = tx
                    .send(AgentEvent::ToolCallStarted {
                        call_id: call.id.clone(),
                        action,
                    })
                    .await;
                let _ = tx
                    .send(AgentEvent::ToolCallFinished {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        accepted: true,
                        reason: None,
                    })
                    .await;

                let post_event = HookEvent {
                    event_type: EventType::PostToolUse,
                    session_id: self.turn_id,
                    agent_id: self.agent_id,
                    tool_name: effective_call.name.clone(),
                    tool_input: effective_call.arguments.clone(),
                    tool_output: Some(serde_json::json!({"accepted": true})),
                    timestamp: chrono::Utc::now(),
                };
                let post_outcome = self
                    .hooks
                    .run(self.agent_id, EventType::PostToolUse, post_event)
                    .await;
                for payload in post_outcome.injects {
                    self.inject(payload.content, payload.strategy);
                }
            }
            Err(reason) => {
                self.session
                    .push(Message::tool_result(&call.id, format!("error: {reason}")));
                let _ = tx
                    .send(AgentEvent::ToolCallFinished {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        accepted: false,
                        reason: Some(reason),
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use massgen_backend::MockSession;
    use massgen_backend::ScriptedMockSession;
    use std::time::Duration;

    fn hooks() -> Arc<HookManager> {
        Arc::new(HookManager::new(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn turn_completes_when_backend_has_no_tool_calls() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let mut runtime = AgentRuntime::new(
            AgentId::new(),
            TurnId::new(),
            Arc::new(MockSession),
            hooks(),
            10_000,
            5,
            "coordinate with your peers",
        );
        let (_inject_tx, inject_rx) = mpsc::channel(4);
        runtime.run_turn(tx, cancel_rx, inject_rx).await.unwrap();

        let mut saw_complete = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, AgentEvent::TurnComplete) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn new_answer_tool_call_is_dispatched() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let backend = ScriptedMockSession::tool_then_text(
            "call-1",
            "new_answer",
            r#"{"text":"42"}"#,
            "done",
        );
        let mut runtime = AgentRuntime::new(
            AgentId::new(),
            TurnId::new(),
            Arc::new(backend),
            hooks(),
            10_000,
            5,
            "coordinate with your peers",
        );
        let (_inject_tx, inject_rx) = mpsc::channel(4);
        runtime.run_turn(tx, cancel_rx, inject_rx).await.unwrap();

        let mut saw_new_answer = false;
        while let Some(event) = rx.recv().await {
            if let AgentEvent::ToolCallStarted { action, .. } = event {
                if matches!(action, crate::tool::CoordinationAction::NewAnswer { .. }) {
                    saw_new_answer = true;
                }
            }
        }
        assert!(saw_new_answer);
    }

    #[tokio::test]
    async fn cancel_before_first_round_aborts_immediately() {
        let (tx, mut rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        cancel_tx.send(()).unwrap();
        let mut runtime = AgentRuntime::new(
            AgentId::new(),
            TurnId::new(),
            Arc::new(MockSession),
            hooks(),
            10_000,
            5,
            "coordinate with your peers",
        );
        let (_inject_tx, inject_rx) = mpsc::channel(4);
        runtime.run_turn(tx, cancel_rx, inject_rx).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AgentEvent::Aborted { .. }));
    }

    #[tokio::test]
    async fn queued_injection_is_applied_before_the_next_round() {
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let backend = ScriptedMockSession::tool_then_text(
            "call-1",
            "new_answer",
            r#"{"text":"42"}"#,
            "done",
        );
        let mut runtime = AgentRuntime::new(
            AgentId::new(),
            TurnId::new(),
            Arc::new(backend),
            hooks(),
            10_000,
            5,
            "coordinate with your peers",
        );
        let before = runtime.session().messages.len();
        let (inject_tx, inject_rx) = mpsc::channel(4);
        inject_tx
            .send(("peer answer arrived".to_string(), InjectStrategy::UserMessage))
            .await
            .unwrap();
        drop(inject_tx);
        runtime.run_turn(tx, cancel_rx, inject_rx).await.unwrap();

        while rx.recv().await.is_some() {}
        let injected = runtime
            .session()
            .messages
            .iter()
            .skip(before)
            .any(|m| m.as_text() == Some("peer answer arrived"));
        assert!(injected);
    }
}
